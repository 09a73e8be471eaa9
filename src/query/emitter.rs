use std::fmt;

use tokio::sync::mpsc;

use crate::search::SearchResult;

pub const LLM_SEPARATOR: &str = "\n\n__LLM_RESPONSE__\n\n";
pub const RELATED_SEPARATOR: &str = "\n\n__RELATED_QUESTIONS__\n\n";

#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("client disconnected")]
    Disconnected,

    #[error("could not encode stream segment: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Start,
    Contexts,
    Answer,
    Related,
    Closed,
}

/// Writes body fragments to the response channel in protocol order.
/// A closed receiver means the caller went away.
#[derive(Debug)]
pub struct StreamingEmitter {
    tx: mpsc::Sender<String>,
    stage: Stage,
}

impl StreamingEmitter {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            tx,
            stage: Stage::Start,
        }
    }

    pub async fn contexts(&mut self, contexts: &[SearchResult]) -> Result<(), EmitError> {
        self.advance(Stage::Contexts);
        let json = serde_json::to_string(contexts)?;
        self.send(json).await
    }

    /// Sends the answer separator; tokens may follow.
    pub async fn begin_answer(&mut self) -> Result<(), EmitError> {
        self.advance(Stage::Answer);
        self.send(LLM_SEPARATOR.to_string()).await
    }

    pub async fn token(&mut self, token: String) -> Result<(), EmitError> {
        debug_assert!(
            matches!(self.stage, Stage::Answer | Stage::Closed),
            "token outside the answer segment"
        );
        self.send(token).await
    }

    pub async fn related(&mut self, questions: &[String]) -> Result<(), EmitError> {
        self.advance(Stage::Related);
        let json = serde_json::to_string(questions)?;
        self.send(RELATED_SEPARATOR.to_string()).await?;
        self.send(json).await
    }

    /// Emits the inline error fragment. Nothing is sent after it.
    pub async fn error(&mut self, err: &impl fmt::Display) -> Result<(), EmitError> {
        if self.stage == Stage::Closed {
            return Ok(());
        }
        self.stage = Stage::Closed;
        self.tx
            .send(format!("Error: {err}"))
            .await
            .map_err(|_| EmitError::Disconnected)
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(self.stage < next, "{next:?} emitted after {:?}", self.stage);
        self.stage = next;
    }

    async fn send(&self, fragment: String) -> Result<(), EmitError> {
        if self.stage == Stage::Closed {
            return Err(EmitError::Disconnected);
        }
        self.tx
            .send(fragment)
            .await
            .map_err(|_| EmitError::Disconnected)
    }
}
