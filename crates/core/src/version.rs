//! Target version expansion into matching labels.

use crate::{Error, Result};

/// Expand `version` into candidate labels, most specific first.
///
/// `4.15.2-ec.3` yields `["4.15.2-ec.3", "4.15.2", "4.15"]`; a plain `4.15.2`
/// yields `["4.15.2", "4.15"]`.
pub fn matching_versions(version: &str) -> Result<Vec<String>> {
    let invalid = |reason| Error::InvalidVersion { version: version.to_string(), reason };

    let core = match version.split_once('-') {
        Some((_, "")) => return Err(invalid("empty pre-release suffix")),
        Some((core, _)) => core,
        None => version,
    };
    let parts: Vec<&str> = core.split('.').collect();
    if parts.len() < 2 {
        return Err(invalid("expected at least major.minor"));
    }
    if parts.len() > 3 {
        return Err(invalid("expected at most major.minor.patch"));
    }
    for p in &parts {
        if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) || p.parse::<u64>().is_err() {
            return Err(invalid("version components must be numeric"));
        }
    }

    let mut out = vec![version.to_string()];
    let mut push = |s: String| {
        if out.last() != Some(&s) {
            out.push(s);
        }
    };
    if parts.len() == 3 {
        push(parts.join("."));
    }
    push(format!("{}.{}", parts[0], parts[1]));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_release_versions_expand_to_three_labels() {
        assert_eq!(matching_versions("4.15.2-ec.3").unwrap(), vec!["4.15.2-ec.3", "4.15.2", "4.15"]);
        assert_eq!(
            matching_versions("4.16.0-0.ci-2024-04-11-051453").unwrap(),
            vec!["4.16.0-0.ci-2024-04-11-051453", "4.16.0", "4.16"]
        );
    }

    #[test]
    fn release_versions_skip_duplicates() {
        assert_eq!(matching_versions("4.15.2").unwrap(), vec!["4.15.2", "4.15"]);
        assert_eq!(matching_versions("4.15").unwrap(), vec!["4.15"]);
    }

    #[test]
    fn malformed_versions_are_rejected() {
        for bad in ["4", "", "4.x.1", "4..1", "4.15.2-", "v4.15.2", "1.2.3.4"] {
            match matching_versions(bad) {
                Err(Error::InvalidVersion { version, .. }) => assert_eq!(version, bad),
                other => panic!("{bad:?} should fail, got {other:?}"),
            }
        }
    }
}
