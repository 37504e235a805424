use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::path::PathBuf;

use crate::log::debug;
use crate::log::warn;
use crate::util::uname_release;
use crate::Config;
use crate::Error;
use crate::ErrorExt as _;
use crate::Result;


/// The magic bytes at the start of gzip compressed data.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[cfg(feature = "zlib")]
fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::read::MultiGzDecoder;

    let mut decompressed = Vec::new();
    let _cnt = MultiGzDecoder::new(data)
        .read_to_end(&mut decompressed)
        .map_err(Error::from)
        .context("failed to decompress gzip data")?;
    Ok(decompressed)
}

#[cfg(not(feature = "zlib"))]
fn decompress_gzip(_data: &[u8]) -> Result<Vec<u8>> {
    Err(Error::with_unsupported(
        "gzip compressed kernel configuration is unsupported without the `zlib` feature",
    ))
}


/// The configuration options of a kernel, as found in `/proc/config.gz`
/// or `/boot/config-<release>`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KConfig {
    options: HashMap<String, String>,
}

impl KConfig {
    /// Read the configuration of the running kernel.
    ///
    /// The file configured via [`Config`] takes precedence over the
    /// system locations. The first readable source is used. If none can
    /// be read, the configuration is empty.
    pub fn new(config: &Config) -> Self {
        let locations = match config.kconfig() {
            Some(path) => vec![path.to_path_buf()],
            None => {
                let mut locations = vec![PathBuf::from("/proc/config.gz")];
                match uname_release() {
                    Ok(release) => {
                        let () = locations.push(PathBuf::from(format!("/boot/config-{release}")));
                    }
                    Err(err) => warn!("failed to determine kernel release: {err:#}"),
                }
                locations
            }
        };

        for path in locations {
            match Self::from_path(&path) {
                Ok(Some(kconfig)) => {
                    debug!(
                        "read {} kernel configuration options from {}",
                        kconfig.len(),
                        path.display()
                    );
                    return kconfig
                }
                Ok(None) => (),
                Err(err) => warn!("{err:#}"),
            }
        }

        debug!("no kernel configuration found");
        Self::default()
    }

    fn from_path(path: &Path) -> Result<Option<Self>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(..) => return Ok(None),
        };
        let kconfig = Self::from_reader(file)
            .with_context(|| format!("failed to read kernel configuration `{}`", path.display()))?;
        Ok(Some(kconfig))
    }

    /// Parse a kernel configuration, which may be gzip compressed.
    ///
    /// Only lines of the form `CONFIG_<name>=<value>` are considered.
    pub fn from_reader<R>(mut reader: R) -> Result<Self>
    where
        R: Read,
    {
        let mut data = Vec::new();
        let _cnt = reader
            .read_to_end(&mut data)
            .context("failed to read kernel configuration")?;

        if data.starts_with(&GZIP_MAGIC) {
            data = decompress_gzip(&data)?;
        }

        let text = String::from_utf8_lossy(&data);
        let options = text
            .lines()
            .filter(|line| line.starts_with("CONFIG_"))
            .filter_map(|line| line.split_once('='))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        Ok(Self { options })
    }

    /// Retrieve the value of option `name` (including the `CONFIG_`
    /// prefix).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    /// Check whether option `name` is set to `value`.
    pub fn has_value(&self, name: &str, value: &str) -> bool {
        self.get(name) == Some(value)
    }

    /// Iterate over all options and their values, in no particular
    /// order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.options
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// The number of options.
    pub fn len(&self) -> usize {
        self.options.len()
    }

    /// Check whether no options are known.
    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}
