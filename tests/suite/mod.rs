mod cgroup;
mod kernel;
mod maps;
mod resolve;
mod system;
