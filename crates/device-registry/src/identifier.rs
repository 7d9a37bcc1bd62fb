use crate::{RegistryError, Result};
use std::collections::HashSet;

/// Issues routing tokens for device paths.
///
/// A token is the path lower-cased, with every run of characters outside
/// `[a-zA-Z0-9]` collapsed to one `-` and no leading or trailing `-`. When that
/// form was already issued, `-1`, `-2`, ... is appended until an unused form is
/// found. Issued tokens are never released.
#[derive(Debug, Default, Clone)]
pub struct PathIdentifier {
    issued: HashSet<String>,
}

impl PathIdentifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// The collision-free form of `path` without recording it.
    pub fn normalize(path: &str) -> Result<String> {
        if path.is_empty() {
            return Err(RegistryError::InvalidInput("empty device path".into()));
        }
        let mut out = String::with_capacity(path.len());
        let mut gap = false;
        for c in path.chars() {
            if c.is_ascii_alphanumeric() {
                if gap && !out.is_empty() {
                    out.push('-');
                }
                gap = false;
                out.push(c.to_ascii_lowercase());
            } else {
                gap = true;
            }
        }
        if out.is_empty() {
            return Err(RegistryError::InvalidInput(format!(
                "device path {path:?} has no alphanumeric characters"
            )));
        }
        Ok(out)
    }

    /// Issue a token for `path`. Each call issues a new token, so assigning the
    /// same path twice yields `<base>` then `<base>-1`.
    pub fn assign(&mut self, path: &str) -> Result<String> {
        let base = Self::normalize(path)?;
        let mut token = base.clone();
        let mut suffix: u64 = 1;
        while self.issued.contains(&token) {
            token = format!("{base}-{suffix}");
            suffix += 1;
        }
        self.issued.insert(token.clone());
        Ok(token)
    }

    pub fn is_issued(&self, token: &str) -> bool {
        self.issued.contains(token)
    }

    pub fn issued_count(&self) -> usize {
        self.issued.len()
    }
}

/// True when `token` is non-empty, made of `[a-z0-9-]` and neither starts nor
/// ends with `-`.
pub fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && !token.starts_with('-')
        && !token.ends_with('-')
        && token
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_hidraw() {
        assert_eq!(
            PathIdentifier::normalize("/dev/hidraw1").unwrap(),
            "dev-hidraw1"
        );
    }

    #[test]
    fn test_normalize_collapses_runs_and_case() {
        assert_eq!(
            PathIdentifier::normalize("IOService:/AppleACPIPlatformExpert//USB@14__HID").unwrap(),
            "ioservice-appleacpiplatformexpert-usb-14-hid"
        );
        assert_eq!(
            PathIdentifier::normalize(r"\\?\hid#vid_16C0&pid_05DF#7&2a").unwrap(),
            "hid-vid-16c0-pid-05df-7-2a"
        );
    }

    #[test]
    fn test_reassigning_same_path_appends_suffix() {
        let mut ids = PathIdentifier::new();
        assert_eq!(ids.assign("/dev/hidraw1").unwrap(), "dev-hidraw1");
        assert_eq!(ids.assign("/dev/hidraw1").unwrap(), "dev-hidraw1-1");
        assert_eq!(ids.assign("/dev/hidraw1").unwrap(), "dev-hidraw1-2");
    }

    #[test]
    fn test_distinct_paths_with_same_normal_form() {
        let mut ids = PathIdentifier::new();
        assert_eq!(ids.assign("/dev/hidraw1").unwrap(), "dev-hidraw1");
        assert_eq!(ids.assign("dev:hidraw1").unwrap(), "dev-hidraw1-1");
        // A path whose own normal form equals an earlier suffixed token.
        assert_eq!(ids.assign("dev/hidraw1/1").unwrap(), "dev-hidraw1-1-1");
    }

    #[test]
    fn test_empty_and_symbol_only_paths_rejected() {
        let mut ids = PathIdentifier::new();
        assert!(matches!(
            ids.assign(""),
            Err(RegistryError::InvalidInput(_))
        ));
        assert!(matches!(
            ids.assign("//--//"),
            Err(RegistryError::InvalidInput(_))
        ));
        assert_eq!(ids.issued_count(), 0);
    }

    #[test]
    fn test_tokens_unique_and_channel_safe() {
        let paths = [
            "/dev/hidraw0",
            "/dev/hidraw0",
            "/dev/hidraw10",
            "/DEV/HIDRAW0",
            "-dev-hidraw0-",
            "dev hidraw0",
            "1-1.2:1.0",
            "1-1.2:1.0",
            "\\\\?\\HID#VID_0001",
            "usb@1/2",
            "usb-1-2",
        ];
        let mut ids = PathIdentifier::new();
        let mut seen = HashSet::new();
        for p in paths {
            let token = ids.assign(p).unwrap();
            assert!(is_valid_token(&token), "bad token {token:?} for {p:?}");
            assert!(seen.insert(token.clone()), "duplicate token {token}");
            assert!(ids.is_issued(&token));
        }
        assert_eq!(ids.issued_count(), paths.len());
    }

    #[test]
    fn test_is_valid_token() {
        assert!(is_valid_token("dev-hidraw1"));
        assert!(!is_valid_token(""));
        assert!(!is_valid_token("-dev"));
        assert!(!is_valid_token("dev-"));
        assert!(!is_valid_token("Dev"));
        assert!(!is_valid_token("dev_hidraw"));
    }
}
