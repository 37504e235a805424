use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::num::NonZeroU32;
use std::process;
use std::str::FromStr;

use crate::Error;


/// The largest PID the kernel hands out (`PID_MAX_LIMIT` on 64 bit
/// systems).
const PID_MAX: u32 = 4 * 1024 * 1024;


/// An enumeration identifying a process.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Pid {
    /// The current process.
    Slf,
    /// The process identified by the provided ID.
    Pid(NonZeroU32),
}

impl Pid {
    /// Resolve this [`Pid`] into an actual number, if it is the symbolic
    /// [`Pid::Slf`] variant.
    pub fn resolve(&self) -> u32 {
        match self {
            Self::Slf => process::id(),
            Self::Pid(pid) => pid.get(),
        }
    }
}

impl Display for Pid {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Slf => write!(f, "self"),
            Self::Pid(pid) => write!(f, "{pid}"),
        }
    }
}

impl From<u32> for Pid {
    fn from(pid: u32) -> Self {
        NonZeroU32::new(pid).map(Pid::Pid).unwrap_or(Pid::Slf)
    }
}

impl FromStr for Pid {
    type Err = Error;

    /// Parse a decimal PID in the range `[1, PID_MAX]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pid = s.parse::<u32>().map_err(|_err| {
            Error::with_invalid_input(format!("pid '{s}' is not a valid decimal number"))
        })?;

        match NonZeroU32::new(pid) {
            Some(pid) if pid.get() <= PID_MAX => Ok(Pid::Pid(pid)),
            _ => Err(Error::with_invalid_input(format!(
                "pid '{s}' out of valid pid range [1,{PID_MAX}]"
            ))),
        }
    }
}
