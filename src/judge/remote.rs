// src/judge/remote.rs

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::session::RoundSession;
use super::verdict::{Verdict, VerdictSource, local_verdict};
use crate::config::JudgeConfig;
use crate::error::{CoreError, Result};
use crate::gesture::Frame;

/// The captured frame for one judged beat, as grayscale bytes.
#[derive(Clone, Debug, Serialize)]
pub struct BeatImage {
    pub index: usize,
    pub width: usize,
    pub height: usize,
    pub luma: Vec<u8>,
}

impl BeatImage {
    fn from_frame(index: usize, frame: &Frame) -> Self {
        let mut luma = Vec::with_capacity(frame.width * frame.height);
        for y in 0..frame.height {
            for x in 0..frame.width {
                luma.push(frame.luma_at(x, y).round().clamp(0.0, 255.0) as u8);
            }
        }
        Self { index, width: frame.width, height: frame.height, luma }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RemoteRequest {
    pub targets: Vec<u8>,
    pub beats: Vec<BeatImage>,
}

impl RemoteRequest {
    /// Targets plus one image per judged beat that captured a frame.
    pub fn from_session(session: &RoundSession) -> Self {
        let beats = session
            .judgments
            .iter()
            .enumerate()
            .filter_map(|(i, j)| j.frame.as_ref().map(|f| BeatImage::from_frame(i, f)))
            .collect();
        Self { targets: session.sequence.clone(), beats }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteVerdict {
    pub success: bool,
    pub per_beat: Vec<bool>,
    pub score: u32,
    #[serde(default)]
    pub feedback: String,
}

pub type JudgeFuture<'a> = Pin<Box<dyn Future<Output = Result<RemoteVerdict>> + Send + 'a>>;

/// Vision service that looks at the captured frames and returns a verdict.
pub trait RemoteJudge: Send + Sync {
    fn judge<'a>(&'a self, request: &'a RemoteRequest) -> JudgeFuture<'a>;
}

/// Posts the round to an HTTP endpoint as JSON.
pub struct HttpVisionJudge {
    client: reqwest::Client,
    url: String,
}

impl HttpVisionJudge {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::RemoteJudge(e.to_string()))?;
        Ok(Self { client, url: url.to_string() })
    }
}

impl RemoteJudge for HttpVisionJudge {
    fn judge<'a>(&'a self, request: &'a RemoteRequest) -> JudgeFuture<'a> {
        Box::pin(async move {
            let res = self
                .client
                .post(&self.url)
                .json(request)
                .send()
                .await
                .map_err(|e| CoreError::RemoteJudge(e.to_string()))?;

            if !res.status().is_success() {
                return Err(CoreError::RemoteJudge(format!("HTTP {}", res.status())));
            }

            res.json::<RemoteVerdict>().await.map_err(|e| CoreError::RemoteJudge(e.to_string()))
        })
    }
}

fn accept_remote(remote: RemoteVerdict, session: &RoundSession) -> Result<Verdict> {
    if remote.per_beat.len() != session.len() {
        return Err(CoreError::RemoteJudge(format!(
            "expected {} beats, got {}",
            session.len(),
            remote.per_beat.len()
        )));
    }
    Ok(Verdict {
        success: remote.success,
        score: remote.score.min(100),
        per_beat: remote.per_beat,
        feedback: remote.feedback,
        source: VerdictSource::Remote,
    })
}

/// Ask the remote judge if there is one, bounded by `remote_timeout_ms`.
/// Any failure falls back to the local tally, marked as degraded.
pub async fn resolve_verdict(remote: Option<&dyn RemoteJudge>, session: &RoundSession, cfg: &JudgeConfig) -> Verdict {
    let local = local_verdict(session, cfg.mode, cfg.success_ratio);
    let Some(remote) = remote else {
        return local;
    };

    let request = RemoteRequest::from_session(session);
    let limit = Duration::from_millis(cfg.remote_timeout_ms);
    let outcome = match tokio::time::timeout(limit, remote.judge(&request)).await {
        Ok(Ok(answer)) => accept_remote(answer, session),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(CoreError::RemoteTimeout(cfg.remote_timeout_ms)),
    };

    match outcome {
        Ok(verdict) => {
            log::info!("🧠 Remote verdict: score {}", verdict.score);
            verdict
        }
        Err(e) => {
            log::warn!("⚠️ Using local judgment: {}", e);
            local.degraded(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoundMode;
    use crate::judge::session::{Judgment, RoundStatus};

    struct Never;

    impl RemoteJudge for Never {
        fn judge<'a>(&'a self, _request: &'a RemoteRequest) -> JudgeFuture<'a> {
            Box::pin(std::future::pending::<Result<RemoteVerdict>>())
        }
    }

    struct Fails;

    impl RemoteJudge for Fails {
        fn judge<'a>(&'a self, _request: &'a RemoteRequest) -> JudgeFuture<'a> {
            Box::pin(async { Err::<RemoteVerdict, _>(CoreError::RemoteJudge("HTTP 503".into())) })
        }
    }

    struct Agrees;

    impl RemoteJudge for Agrees {
        fn judge<'a>(&'a self, request: &'a RemoteRequest) -> JudgeFuture<'a> {
            let n = request.targets.len();
            Box::pin(async move {
                Ok::<_, CoreError>(RemoteVerdict {
                    success: true,
                    per_beat: vec![true; n],
                    score: 100,
                    feedback: "clean".into(),
                })
            })
        }
    }

    fn finished(marks: &[Judgment]) -> RoundSession {
        let mut s = RoundSession::new(RoundMode::Fixed, 1, 90.0, vec![2; marks.len()], RoundStatus::Analyzing);
        for (rec, mark) in s.judgments.iter_mut().zip(marks) {
            rec.judgment = *mark;
        }
        s
    }

    fn cfg(timeout_ms: u64) -> JudgeConfig {
        JudgeConfig { remote_timeout_ms: timeout_ms, ..JudgeConfig::default() }
    }

    #[tokio::test]
    async fn silent_remote_times_out_to_the_local_score() {
        use Judgment::*;
        let session = finished(&[Hit, Miss, Hit]);
        let v = resolve_verdict(Some(&Never), &session, &cfg(50)).await;
        assert_eq!(v.score, 67);
        assert!(v.success);
        assert_eq!(v.source, VerdictSource::LocalFallback { reason: "remote judge timed out after 50 ms".into() });
    }

    #[tokio::test]
    async fn remote_errors_degrade_instead_of_failing() {
        let session = finished(&[Judgment::Hit]);
        let v = resolve_verdict(Some(&Fails), &session, &cfg(1000)).await;
        assert!(v.is_degraded());
        assert_eq!(v.score, 100);
    }

    #[tokio::test]
    async fn remote_answer_is_used_when_it_arrives() {
        let session = finished(&[Judgment::Hit, Judgment::Hit]);
        let v = resolve_verdict(Some(&Agrees), &session, &cfg(1000)).await;
        assert_eq!(v.source, VerdictSource::Remote);
        assert_eq!(v.feedback, "clean");
    }

    #[tokio::test]
    async fn without_a_remote_the_local_verdict_stands() {
        let session = finished(&[Judgment::Miss]);
        let v = resolve_verdict(None, &session, &cfg(1000)).await;
        assert_eq!(v.source, VerdictSource::Local);
        assert!(!v.success);
    }
}
