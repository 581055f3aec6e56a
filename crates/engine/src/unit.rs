//! Computation unit threads and their async client.
//!
//! [`ComputeUnit::spawn`] starts one named OS thread that owns an
//! [`Engine`] and serves requests strictly one at a time. The returned
//! [`UnitClient`] can be cloned freely; the thread exits once every clone
//! has been dropped.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use palettepool_core::panic_message;
use tokio::sync::{mpsc, oneshot};

use crate::engine::{Engine, GeneratedPalette};
use crate::error::EngineError;
use crate::protocol::{EngineRequest, EngineResponse};

/// Requests buffered per unit before `call` waits for room.
const REQUEST_CHANNEL_CAPACITY: usize = 16;

type Reply = oneshot::Sender<Result<EngineResponse, EngineError>>;

struct Envelope {
    request: EngineRequest,
    reply: Reply,
}

/// Entry point for starting computation units.
pub struct ComputeUnit;

impl ComputeUnit {
    /// Spawn a unit thread named `name` that hosts `engine`.
    pub fn spawn<E: Engine>(name: impl Into<String>, engine: E) -> Result<UnitClient, EngineError> {
        let name: Arc<str> = Arc::from(name.into());
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);

        let unit_name = Arc::clone(&name);
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_unit(&unit_name, engine, rx))
            .map_err(|e| EngineError::Spawn(e.to_string()))?;

        tracing::debug!(unit = %name, "Computation unit spawned");
        Ok(UnitClient { name, tx })
    }
}

/// Serve requests until every sender is gone.
fn run_unit<E: Engine>(name: &str, mut engine: E, mut rx: mpsc::Receiver<Envelope>) {
    while let Some(Envelope { request, reply }) = rx.blocking_recv() {
        let op = request.name();
        let started = Instant::now();

        let result = panic::catch_unwind(AssertUnwindSafe(|| request.execute(&mut engine)))
            .unwrap_or_else(|payload| Err(EngineError::Panicked(panic_message(&*payload))));

        match &result {
            Ok(_) => tracing::trace!(
                unit = name,
                op,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Operation finished",
            ),
            Err(e) => tracing::debug!(unit = name, op, error = %e, "Operation failed"),
        }

        if reply.send(result).is_err() {
            tracing::debug!(unit = name, op, "Caller went away before the reply");
        }
    }
    tracing::debug!(unit = name, "Computation unit stopped");
}

/// Async handle to a computation unit.
#[derive(Clone)]
pub struct UnitClient {
    name: Arc<str>,
    tx: mpsc::Sender<Envelope>,
}

impl fmt::Debug for UnitClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitClient")
            .field("name", &self.name)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl UnitClient {
    /// Thread name of the unit.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` once the unit thread has exited.
    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }

    /// Validate `request`, send it to the unit and wait for the reply.
    ///
    /// Invalid requests are rejected locally and never reach the unit.
    pub async fn call(&self, request: EngineRequest) -> Result<EngineResponse, EngineError> {
        request.validate()?;

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { request, reply })
            .await
            .map_err(|_| self.stopped())?;

        rx.await.map_err(|_| self.stopped())?
    }

    pub async fn gen_palette(
        &self,
        pixels: Vec<u8>,
        count: usize,
        seed: u64,
    ) -> Result<GeneratedPalette, EngineError> {
        match self
            .call(EngineRequest::GenPalette {
                pixels,
                count,
                seed,
            })
            .await?
        {
            EngineResponse::Palette(palette) => Ok(palette),
            _ => Err(EngineError::UnexpectedResponse("palette")),
        }
    }

    pub async fn encode_image(
        &self,
        palette: Vec<u8>,
        pixels: Vec<u8>,
    ) -> Result<Vec<u8>, EngineError> {
        self.call(EngineRequest::EncodeImage { palette, pixels })
            .await
            .and_then(expect_bytes)
    }

    pub async fn decode_image(
        &self,
        palette: Vec<u8>,
        encoded: Vec<u8>,
    ) -> Result<Vec<u8>, EngineError> {
        self.call(EngineRequest::DecodeImage { palette, encoded })
            .await
            .and_then(expect_bytes)
    }

    pub async fn compute_loss(
        &self,
        original: Vec<u8>,
        roundtripped: Vec<u8>,
    ) -> Result<f32, EngineError> {
        match self
            .call(EngineRequest::ComputeLoss {
                original,
                roundtripped,
            })
            .await?
        {
            EngineResponse::Loss(loss) => Ok(loss),
            _ => Err(EngineError::UnexpectedResponse("loss")),
        }
    }

    pub async fn build_full_lut(&self, palette: Vec<u8>) -> Result<Vec<u8>, EngineError> {
        self.call(EngineRequest::BuildFullLut { palette })
            .await
            .and_then(expect_bytes)
    }

    /// Replace the unit's crossfade textures. Later
    /// [`crossfade_generate`](Self::crossfade_generate) calls on the same
    /// unit see them; other units do not.
    pub async fn set_crossfade_textures(&self, textures: Vec<Vec<u8>>) -> Result<(), EngineError> {
        match self
            .call(EngineRequest::SetCrossfadeTextures { textures })
            .await?
        {
            EngineResponse::Done => Ok(()),
            _ => Err(EngineError::UnexpectedResponse("done")),
        }
    }

    pub async fn crossfade_generate(
        &self,
        width: usize,
        height: usize,
        threshold: f32,
        debug: bool,
    ) -> Result<Vec<u8>, EngineError> {
        self.call(EngineRequest::CrossfadeGenerate {
            width,
            height,
            threshold,
            debug,
        })
        .await
        .and_then(expect_bytes)
    }

    fn stopped(&self) -> EngineError {
        EngineError::UnitStopped(self.name.to_string())
    }
}

fn expect_bytes(response: EngineResponse) -> Result<Vec<u8>, EngineError> {
    match response {
        EngineResponse::Bytes(bytes) => Ok(bytes),
        _ => Err(EngineError::UnexpectedResponse("bytes")),
    }
}
