use atomic_enum::atomic_enum;
use chrono::{DateTime, Utc};
use leafcam_core::http::EnvironmentalContext;
use schemars::JsonSchema;
use std::{
	sync::{atomic::Ordering, Arc},
	time::Duration,
};
use tokio::sync::{
	mpsc::{self, error::TrySendError},
	oneshot, RwLock,
};

use crate::{
	helpers::with_timing,
	pipeline::{Diagnoser, Diagnosis},
	shutdown::Shutdown,
	upload::Upload,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Model is not ready")]
	NotReady,

	#[error("Too many diagnoses in progress, try again later")]
	Busy,

	#[error("Runner has shut down")]
	Closed,

	#[error(transparent)]
	Diagnosis(#[from] leafcam_core::Error),
}

#[atomic_enum]
#[derive(PartialEq, Eq, serde::Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
	Unknown,
	Starting,
	Ready,
	Busy,
	SetupFailed,
}

#[derive(Debug, Clone, serde::Serialize, JsonSchema)]
pub struct Setup {
	pub started_at: DateTime<Utc>,
	pub completed_at: Option<DateTime<Utc>>,
	/// Why the model could not be loaded
	pub error: Option<String>,
}

/// A photo waiting to be diagnosed. The upload is deleted once the job is dropped.
#[derive(Debug)]
pub struct Job {
	pub upload: Upload,
	pub env: EnvironmentalContext,
}

type ResponseSender = oneshot::Sender<Result<(Diagnosis, Duration), Error>>;

/// Serialises diagnoses onto a single worker that owns the model.
#[derive(Clone)]
pub struct Runner {
	health: Arc<AtomicHealth>,
	setup: Arc<RwLock<Setup>>,
	sender: mpsc::Sender<(ResponseSender, Job)>,
}

impl Runner {
	/// Spawn the worker. `setup` runs on the blocking pool; a failed setup shuts the server down.
	pub fn new<F>(setup: F, queue_depth: usize, shutdown: Shutdown) -> Self
	where
		F: FnOnce() -> leafcam_core::Result<Diagnoser> + Send + 'static,
	{
		let health = Arc::new(AtomicHealth::new(Health::Starting));
		let info = Arc::new(RwLock::new(Setup {
			started_at: Utc::now(),
			completed_at: None,
			error: None,
		}));

		let (sender, mut rx) = mpsc::channel::<(ResponseSender, Job)>(queue_depth.max(1));

		let worker_health = health.clone();
		let worker_info = info.clone();
		let handle_shutdown = shutdown.clone();
		let handle = tokio::spawn(async move {
			let setup = match tokio::task::spawn_blocking(setup).await {
				Ok(result) => result.map_err(|e| e.to_string()),
				Err(e) => Err(e.to_string()),
			};

			let diagnoser = match setup {
				Ok(diagnoser) => diagnoser,
				Err(error) => {
					tracing::error!("Failed to set up the model: {error}");

					let mut info = worker_info.write().await;
					info.completed_at = Some(Utc::now());
					info.error = Some(error);
					drop(info);

					handle_shutdown.start();
					worker_health.store(Health::SetupFailed, Ordering::SeqCst);
					return;
				},
			};

			worker_info.write().await.completed_at = Some(Utc::now());
			worker_health.store(Health::Ready, Ordering::SeqCst);
			tracing::info!("Model ready");

			while let Some((tx, job)) = rx.recv().await {
				worker_health.store(Health::Busy, Ordering::SeqCst);

				let diagnoser = diagnoser.clone();
				let result = tokio::task::spawn_blocking(move || {
					with_timing(|| diagnoser.diagnose(job.upload.path(), &job.env))
				})
				.await;

				let response = match result {
					Ok((Ok(diagnosis), elapsed)) => Ok((diagnosis, elapsed)),
					Ok((Err(e), _)) => Err(Error::Diagnosis(e)),
					Err(e) => {
						tracing::error!("Diagnosis task failed: {e}");
						Err(Error::Closed)
					},
				};

				if tx.send(response).is_err() {
					tracing::debug!("Client went away before its diagnosis finished");
				}

				worker_health.store(Health::Ready, Ordering::SeqCst);
			}
		});

		tokio::spawn(async move {
			shutdown.handle().await;
			handle.abort();
		});

		Self {
			health,
			setup: info,
			sender,
		}
	}

	#[must_use]
	pub fn health(&self) -> Health {
		self.health.load(Ordering::SeqCst)
	}

	pub async fn setup(&self) -> Setup {
		self.setup.read().await.clone()
	}

	/// Queue a diagnosis and wait for it.
	///
	/// # Errors
	///
	/// Returns [`Error::NotReady`] before the model is loaded, [`Error::Busy`] when the queue is full, or the
	/// diagnosis's own failure.
	pub async fn run(&self, job: Job) -> Result<(Diagnosis, Duration), Error> {
		if !matches!(self.health(), Health::Ready | Health::Busy) {
			return Err(Error::NotReady);
		}

		let (tx, rx) = oneshot::channel();
		self.sender.try_send((tx, job)).map_err(|e| match e {
			TrySendError::Full(_) => Error::Busy,
			TrySendError::Closed(_) => Error::Closed,
		})?;

		let (diagnosis, elapsed) = rx.await.map_err(|_| Error::Closed)??;
		tracing::debug!("Diagnosed {} in {elapsed:?}", diagnosis.record.disease);

		Ok((diagnosis, elapsed))
	}
}
