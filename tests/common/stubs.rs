use pattern_curator::enrichment::{
    FetchError, ImageFetcher, ImagePayload, OracleError, OracleRequest, PatternOracle, Sleeper,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Oracle that replays scripted replies, then answers `fallback`.
pub struct StubOracle {
    replies: Mutex<VecDeque<Result<String, OracleError>>>,
    fallback: String,
    calls: Mutex<usize>,
}

impl StubOracle {
    pub fn always(answer: &str) -> Arc<Self> {
        Self::scripted(vec![], answer)
    }

    pub fn scripted(replies: Vec<Result<String, OracleError>>, fallback: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            fallback: fallback.to_string(),
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl PatternOracle for StubOracle {
    fn name(&self) -> &str {
        "stub"
    }

    fn classify(&self, _request: &OracleRequest<'_>) -> Result<String, OracleError> {
        *self.calls.lock().unwrap() += 1;
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Fetcher that returns a tiny payload and records requested URLs.
#[derive(Default)]
pub struct StubFetcher {
    urls: Mutex<Vec<String>>,
}

impl StubFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl ImageFetcher for StubFetcher {
    fn fetch(&self, url: &str) -> Result<ImagePayload, FetchError> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(ImagePayload {
            bytes: vec![0xFF, 0xD8, 0xFF, 0xE0],
            media_type: "image/jpeg".to_string(),
        })
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}
