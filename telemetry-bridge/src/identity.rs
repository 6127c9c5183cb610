//! Startup identity resolution: which config profile this station uses.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::source::{split_lines, SensorSource, BANNER_QUERY};

pub const BANNER_ATTEMPTS: u32 = 5;
pub const BANNER_RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("no known banner in device output after {attempts} attempts; known banners are {banners:?}")]
    NoBanner { attempts: u32, banners: Vec<String> },
    #[error("hostname '{hostname}' not found in host map; known hosts are {known:?}")]
    UnknownHost { hostname: String, known: Vec<String> },
    #[error("the identity map is empty")]
    EmptyMap,
}

/// First banner entry contained in `line`.
pub fn match_banner<'a>(line: &str, banners: &'a [(String, String)]) -> Option<&'a str> {
    banners
        .iter()
        .find(|(banner, _)| line.contains(banner.as_str()))
        .map(|(_, key)| key.as_str())
}

/// Ask the device for its banner until one of `banners` shows up.
pub async fn resolve_by_banner<S: SensorSource>(
    source: &mut S,
    banners: &[(String, String)],
    attempts: u32,
    delay: Duration,
) -> Result<String, IdentityError> {
    if banners.is_empty() {
        return Err(IdentityError::EmptyMap);
    }

    for attempt in 1..=attempts {
        match source.query(BANNER_QUERY).await {
            Ok(raw) => {
                for line in split_lines(&raw) {
                    println!("{}", line);
                    if let Some(key) = match_banner(line, banners) {
                        info!("Banner '{}' identifies profile '{}'", line, key);
                        return Ok(key.to_string());
                    }
                }
                debug!("No known banner on attempt {}/{}", attempt, attempts);
            }
            Err(e) => warn!("Banner query failed on attempt {}/{}: {}", attempt, attempts, e),
        }
        if attempt < attempts {
            tokio::time::sleep(delay).await;
        }
    }

    Err(IdentityError::NoBanner {
        attempts,
        banners: banners.iter().map(|(b, _)| b.clone()).collect(),
    })
}

/// Exact hostname lookup.
pub fn resolve_by_hostname(
    hostname: &str,
    hosts: &[(String, String)],
) -> Result<String, IdentityError> {
    if hosts.is_empty() {
        return Err(IdentityError::EmptyMap);
    }
    hosts
        .iter()
        .find(|(host, _)| host == hostname)
        .map(|(_, key)| key.clone())
        .ok_or_else(|| IdentityError::UnknownHost {
            hostname: hostname.to_string(),
            known: hosts.iter().map(|(h, _)| h.clone()).collect(),
        })
}

pub fn local_hostname() -> String {
    gethostname::gethostname().to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSource;

    fn map(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn test_match_banner_substring() {
        let banners = map(&[("Lucky7 Garage", "garage"), ("Lucky7 Attic", "attic")]);
        assert_eq!(match_banner("** Lucky7 Attic v2.1 **", &banners), Some("attic"));
        assert_eq!(match_banner("Lucky7", &banners), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_banner_found_on_later_attempt() {
        let mut source = ScriptedSource::new(["", "booting...\r\n", "Lucky7 Garage\r\n"]);
        let banners = map(&[("Lucky7 Garage", "garage")]);
        let key = resolve_by_banner(&mut source, &banners, BANNER_ATTEMPTS, BANNER_RETRY_DELAY)
            .await
            .unwrap();
        assert_eq!(key, "garage");
        assert_eq!(source.queries(), vec![b"i".to_vec(); 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_banner_gives_up() {
        let mut source = ScriptedSource::new(["noise"; 5]);
        let banners = map(&[("Lucky7 Garage", "garage")]);
        let err = resolve_by_banner(&mut source, &banners, BANNER_ATTEMPTS, BANNER_RETRY_DELAY)
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::NoBanner { attempts: 5, .. }));
        assert_eq!(source.queries().len(), 5);
    }

    #[test]
    fn test_hostname_lookup() {
        let hosts = map(&[("pi-garage", "garage"), ("pi-attic", "attic")]);
        assert_eq!(resolve_by_hostname("pi-attic", &hosts).unwrap(), "attic");
        assert!(matches!(
            resolve_by_hostname("pi-cellar", &hosts),
            Err(IdentityError::UnknownHost { .. })
        ));
        assert!(matches!(resolve_by_hostname("x", &[]), Err(IdentityError::EmptyMap)));
    }
}
