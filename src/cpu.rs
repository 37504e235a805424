//! Discovery of the system's CPUs.

use std::fs;

use crate::Error;
use crate::ErrorExt as _;
use crate::IntoError as _;
use crate::Result;


const ONLINE_CPUS: &str = "/sys/devices/system/cpu/online";
const POSSIBLE_CPUS: &str = "/sys/devices/system/cpu/possible";


fn parse_cpu(cpu: &str) -> Result<u32> {
    cpu.trim()
        .parse()
        .map_err(|err| Error::with_invalid_data(format!("invalid CPU number `{cpu}`: {err}")))
}

/// Parse a CPU list in the kernel's list format (e.g., `0-3,5`).
pub fn parse_cpu_range(range: &str) -> Result<Vec<u32>> {
    let mut cpus = Vec::new();
    for part in range.trim().split(',') {
        match part.split_once('-') {
            None => cpus.push(parse_cpu(part)?),
            Some((start, end)) => {
                let start = parse_cpu(start)?;
                let end = parse_cpu(end)?;
                if start > end {
                    return Err(Error::with_invalid_data(format!(
                        "invalid CPU range `{part}`"
                    )))
                }
                let () = cpus.extend(start..=end);
            }
        }
    }
    Ok(cpus)
}

fn read_cpu_range(path: &str) -> Result<Vec<u32>> {
    let range = fs::read_to_string(path).with_context(|| format!("failed to read `{path}`"))?;
    parse_cpu_range(&range).with_context(|| format!("failed to parse `{path}`"))
}

/// Retrieve the list of online CPUs.
pub fn online_cpus() -> Result<Vec<u32>> {
    read_cpu_range(ONLINE_CPUS)
}

/// Retrieve the list of possible CPUs.
pub fn possible_cpus() -> Result<Vec<u32>> {
    read_cpu_range(POSSIBLE_CPUS)
}

/// Round `value` up to the next power of two. Zero stays zero.
pub fn round_up_to_next_power_of_two(value: u32) -> u32 {
    if value == 0 {
        return 0
    }
    value.checked_next_power_of_two().unwrap_or(0)
}

fn max_cpu_id_for(num_cpus: usize) -> Result<u32> {
    let num_cpus = u32::try_from(num_cpus)
        .ok()
        .filter(|num| *num > 0)
        .ok_or_invalid_data(|| format!("unexpected number of possible CPUs: {num_cpus}"))?;
    Ok(round_up_to_next_power_of_two(num_cpus).wrapping_sub(1))
}

/// Compute a mask suitable for bounding CPU IDs.
///
/// Possible CPUs are numbered without gaps, starting at zero. The
/// result is the number of possible CPUs, rounded up to the next power
/// of two, minus one.
pub fn max_cpu_id() -> Result<u32> {
    let cpus = possible_cpus()?;
    max_cpu_id_for(cpus.len())
}
