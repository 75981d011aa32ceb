//! SDK API description strings.
//!
//! Linked SDK and middleware libraries leave a NUL-separated list of
//! `+`-separated markers in the read-only segment:
//! ```text
//! SDK Version+<revision>
//! SDK MW+<vendor>+<module>
//! SDK Debug+<vendor>+<module>
//! SDK Private+<vendor>+<module>
//! ```

use std::fmt;

const SEPARATOR: char = '+';

const PREFIX_VERSION: &str = "SDK Version";
const PREFIX_MIDDLEWARE: &str = "SDK MW";
const PREFIX_DEBUG: &str = "SDK Debug";
const PREFIX_PRIVATE: &str = "SDK Private";

/// One recognised API marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkApiString {
    /// SDK revision the program was built with.
    SdkVersion { module: String },
    /// Public (middleware) API.
    Middleware { vendor: String, module: String },
    Debug { vendor: String, module: String },
    Private { vendor: String, module: String },
}

impl SdkApiString {
    /// Parse a single marker, `None` if it is not one.
    pub fn parse(line: &str) -> Option<Self> {
        let (kind, rest) = line.split_once(SEPARATOR)?;
        if kind == PREFIX_VERSION {
            return (!rest.is_empty()).then(|| Self::SdkVersion {
                module: rest.to_owned(),
            });
        }

        let (vendor, module) = rest.split_once(SEPARATOR)?;
        if vendor.is_empty() || module.is_empty() {
            return None;
        }
        let (vendor, module) = (vendor.to_owned(), module.to_owned());
        match kind {
            PREFIX_MIDDLEWARE => Some(Self::Middleware { vendor, module }),
            PREFIX_DEBUG => Some(Self::Debug { vendor, module }),
            PREFIX_PRIVATE => Some(Self::Private { vendor, module }),
            _ => None,
        }
    }

    pub fn module(&self) -> &str {
        match self {
            Self::SdkVersion { module }
            | Self::Middleware { module, .. }
            | Self::Debug { module, .. }
            | Self::Private { module, .. } => module,
        }
    }

    /// Vendor name; the version marker has none.
    pub fn vendor(&self) -> Option<&str> {
        match self {
            Self::SdkVersion { .. } => None,
            Self::Middleware { vendor, .. }
            | Self::Debug { vendor, .. }
            | Self::Private { vendor, .. } => Some(vendor),
        }
    }
}

impl fmt::Display for SdkApiString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SdkVersion { module } => write!(f, "{PREFIX_VERSION}{SEPARATOR}{module}"),
            Self::Middleware { vendor, module } => {
                write!(f, "{PREFIX_MIDDLEWARE}{SEPARATOR}{vendor}{SEPARATOR}{module}")
            }
            Self::Debug { vendor, module } => {
                write!(f, "{PREFIX_DEBUG}{SEPARATOR}{vendor}{SEPARATOR}{module}")
            }
            Self::Private { vendor, module } => {
                write!(f, "{PREFIX_PRIVATE}{SEPARATOR}{vendor}{SEPARATOR}{module}")
            }
        }
    }
}

/// Parse every marker in a NUL-separated blob, in blob order.
///
/// Empty and unrecognised lines are skipped.
pub fn parse_api_strings(blob: &[u8]) -> Vec<SdkApiString> {
    blob.split(|&b| b == 0)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let line = String::from_utf8_lossy(line);
            let api = SdkApiString::parse(&line);
            if api.is_none() {
                tracing::trace!(%line, "skipping unrecognised API string");
            }
            api
        })
        .collect()
}
