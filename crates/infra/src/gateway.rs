//! Client side of the external write target.
//!
//! The retry engine only needs two calls: "may I write `uid` now?" and "write
//! these bytes for `uid`". Both must be safe to repeat; the engine delivers
//! at-least-once and stops retrying as soon as a write returns success.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use writeq_core::JobUid;

/// Failure talking to the write target.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("target answered with status {status}")]
    Status { status: u16 },
    #[error("undecodable response: {0}")]
    Decode(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("invalid target url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// External write target, as seen by a retry executor.
#[async_trait]
pub trait WriteGateway: Send + Sync {
    /// Whether the target currently accepts a write for `uid`.
    async fn write_check(&self, uid: &JobUid) -> Result<bool, GatewayError>;

    /// Write `data` for `uid`.
    async fn write_data(&self, uid: &JobUid, data: &[u8]) -> Result<(), GatewayError>;
}

#[async_trait]
impl<G: WriteGateway + ?Sized> WriteGateway for std::sync::Arc<G> {
    async fn write_check(&self, uid: &JobUid) -> Result<bool, GatewayError> {
        (**self).write_check(uid).await
    }

    async fn write_data(&self, uid: &JobUid, data: &[u8]) -> Result<(), GatewayError> {
        (**self).write_data(uid, data).await
    }
}

#[derive(Debug, Deserialize)]
struct WritableResponse {
    writable: bool,
}

/// HTTP adapter for the write target.
///
/// - `GET  {base}/writable/{uid}` → `{"writable": bool}`
/// - `PUT  {base}/data/{uid}` with the raw bytes
#[derive(Debug, Clone)]
pub struct HttpWriteGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWriteGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let base_url = base_url.into();
        let parsed = reqwest::Url::parse(&base_url).map_err(|e| GatewayError::InvalidUrl {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(GatewayError::InvalidUrl {
                reason: format!("unsupported scheme {:?}", parsed.scheme()),
                url: base_url,
            });
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str, uid: &JobUid) -> String {
        format!("{}/{}/{}", self.base_url, path, urlencoding::encode(uid.as_str()))
    }
}

#[async_trait]
impl WriteGateway for HttpWriteGateway {
    async fn write_check(&self, uid: &JobUid) -> Result<bool, GatewayError> {
        let res = self.client.get(self.url("writable", uid)).send().await?;
        if !res.status().is_success() {
            return Err(GatewayError::Status {
                status: res.status().as_u16(),
            });
        }
        let body: WritableResponse = res
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(body.writable)
    }

    async fn write_data(&self, uid: &JobUid, data: &[u8]) -> Result<(), GatewayError> {
        let res = self
            .client
            .put(self.url("data", uid))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data.to_vec())
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(GatewayError::Status {
                status: res.status().as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use scripted::{ScriptedGateway, ScriptedWrite};

#[cfg(any(test, feature = "test-util"))]
mod scripted {
    use std::collections::VecDeque;
    use std::sync::{Mutex, PoisonError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Scripted answer for a write call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ScriptedWrite {
        Ok,
        Fail,
    }

    /// Gateway double that replays scripted answers and counts calls.
    ///
    /// Once a script runs out, its last answer repeats (or the default:
    /// writable / write ok).
    #[derive(Debug, Default)]
    pub struct ScriptedGateway {
        checks: Mutex<VecDeque<Option<bool>>>,
        last_check: Mutex<Option<Option<bool>>>,
        writes: Mutex<VecDeque<ScriptedWrite>>,
        last_write: Mutex<Option<ScriptedWrite>>,
        written: Mutex<Vec<(JobUid, Vec<u8>)>>,
        check_calls: AtomicUsize,
        write_calls: AtomicUsize,
    }

    impl ScriptedGateway {
        /// Always writable, writes always succeed.
        pub fn always_ok() -> Self {
            Self::default()
        }

        /// Probe answers in order; `None` scripts a probe error.
        pub fn with_checks(self, checks: impl IntoIterator<Item = Option<bool>>) -> Self {
            *self.checks.lock().unwrap_or_else(PoisonError::into_inner) = checks.into_iter().collect();
            self
        }

        pub fn with_writes(self, writes: impl IntoIterator<Item = ScriptedWrite>) -> Self {
            *self.writes.lock().unwrap_or_else(PoisonError::into_inner) = writes.into_iter().collect();
            self
        }

        pub fn check_calls(&self) -> usize {
            self.check_calls.load(Ordering::SeqCst)
        }

        pub fn write_calls(&self) -> usize {
            self.write_calls.load(Ordering::SeqCst)
        }

        /// Payloads of the writes that succeeded, in order.
        pub fn written(&self) -> Vec<(JobUid, Vec<u8>)> {
            self.written.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    #[async_trait]
    impl WriteGateway for ScriptedGateway {
        async fn write_check(&self, _uid: &JobUid) -> Result<bool, GatewayError> {
            self.check_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.checks.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
            let answer = match next {
                Some(answer) => {
                    *self.last_check.lock().unwrap_or_else(PoisonError::into_inner) = Some(answer);
                    answer
                }
                None => self.last_check.lock().unwrap_or_else(PoisonError::into_inner).unwrap_or(Some(true)),
            };
            answer.ok_or_else(|| GatewayError::Rejected("scripted probe failure".to_string()))
        }

        async fn write_data(&self, uid: &JobUid, data: &[u8]) -> Result<(), GatewayError> {
            self.write_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.writes.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
            let answer = match next {
                Some(answer) => {
                    *self.last_write.lock().unwrap_or_else(PoisonError::into_inner) = Some(answer);
                    answer
                }
                None => self.last_write.lock().unwrap_or_else(PoisonError::into_inner).unwrap_or(ScriptedWrite::Ok),
            };
            match answer {
                ScriptedWrite::Ok => {
                    self.written
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((uid.clone(), data.to_vec()));
                    Ok(())
                }
                ScriptedWrite::Fail => Err(GatewayError::Rejected("scripted write failure".to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments_are_escaped() {
        let gw = HttpWriteGateway::new("http://target", Duration::from_secs(1)).unwrap();
        let url = |uid: &str| gw.url("data", &JobUid::new(uid).unwrap());

        assert_eq!(url("abc-123_x.y~z"), "http://target/data/abc-123_x.y~z");
        assert_eq!(url("a/b c"), "http://target/data/a%2Fb%20c");
        assert_eq!(url("ü"), "http://target/data/%C3%BC");
    }

    #[test]
    fn malformed_base_url_is_rejected() {
        for bad in ["not a url", "ftp://target", ""] {
            let err = HttpWriteGateway::new(bad, Duration::from_secs(1)).unwrap_err();
            assert!(matches!(err, GatewayError::InvalidUrl { .. }), "{bad:?} gave {err}");
        }
    }

    #[test]
    fn base_url_trailing_slash_is_dropped() {
        let gw = HttpWriteGateway::new("http://target:9000/", Duration::from_secs(1)).unwrap();
        let uid = JobUid::new("abc").unwrap();
        assert_eq!(gw.url("writable", &uid), "http://target:9000/writable/abc");
    }

    #[tokio::test]
    async fn scripted_gateway_replays_then_repeats() {
        let gw = ScriptedGateway::always_ok().with_checks([Some(false), None, Some(true)]);
        let uid = JobUid::new("a").unwrap();

        assert!(!gw.write_check(&uid).await.unwrap());
        assert!(gw.write_check(&uid).await.is_err());
        assert!(gw.write_check(&uid).await.unwrap());
        assert!(gw.write_check(&uid).await.unwrap());
        assert_eq!(gw.check_calls(), 4);
    }

    #[tokio::test]
    async fn unreachable_target_is_a_transport_error() {
        // Port 9 (discard) on localhost is almost never listening.
        let gw = HttpWriteGateway::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let uid = JobUid::new("a").unwrap();
        let err = gw.write_check(&uid).await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }
}
