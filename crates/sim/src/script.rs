use rand::Rng;
use snafu::{Snafu, ensure};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ScriptError {
    #[snafu(display("response pool has no candidate responses"))]
    EmptyResponsePool { stage: &'static str },
    #[snafu(display("response pool entry {index} is blank"))]
    BlankResponse { stage: &'static str, index: usize },
}

pub type ScriptResult<T> = Result<T, ScriptError>;

/// Validated, non-empty ordered collection of candidate reply strings.
///
/// An empty pool is a configuration error caught at construction, never a
/// per-turn condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePool {
    responses: Vec<String>,
}

impl ResponsePool {
    pub fn new(responses: Vec<String>) -> ScriptResult<Self> {
        ensure!(
            !responses.is_empty(),
            EmptyResponsePoolSnafu {
                stage: "response-pool-new",
            }
        );

        for (index, response) in responses.iter().enumerate() {
            ensure!(
                !response.trim().is_empty(),
                BlankResponseSnafu {
                    stage: "response-pool-new",
                    index,
                }
            );
        }

        Ok(Self { responses })
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        // Construction rejects empty pools; kept for API completeness.
        self.responses.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.responses.get(index).map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.responses
    }

    pub fn contains(&self, candidate: &str) -> bool {
        self.responses.iter().any(|response| response == candidate)
    }
}

/// Pluggable choice of the next reply so tests can pin the selection.
pub trait ResponseSelector: Send {
    /// Returns an index in `0..len`. `len` is always at least 1.
    fn pick(&mut self, len: usize) -> usize;
}

/// Uniform random choice over the pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformSelector;

impl ResponseSelector for UniformSelector {
    fn pick(&mut self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Deterministic selector for tests and demos.
#[derive(Debug, Clone, Copy)]
pub struct FixedSelector(pub usize);

impl ResponseSelector for FixedSelector {
    fn pick(&mut self, len: usize) -> usize {
        self.0 % len
    }
}

/// Draws full, untruncated replies from a validated pool.
pub struct ScriptedResponder {
    pool: ResponsePool,
    selector: Box<dyn ResponseSelector>,
}

impl ScriptedResponder {
    pub fn new(pool: ResponsePool, selector: Box<dyn ResponseSelector>) -> Self {
        Self { pool, selector }
    }

    pub fn uniform(pool: ResponsePool) -> Self {
        Self::new(pool, Box::new(UniformSelector))
    }

    pub fn pool(&self) -> &ResponsePool {
        &self.pool
    }

    pub fn next_reply(&mut self) -> String {
        let len = self.pool.len();
        let picked = self.selector.pick(len);
        // Clamp so a misbehaving selector cannot index out of bounds.
        let index = picked.min(len - 1);
        if picked != index {
            tracing::warn!(picked, len, "selector returned an out-of-range index");
        }

        tracing::debug!(index, "selected scripted reply");
        self.pool.responses[index].clone()
    }
}
