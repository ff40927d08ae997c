use axum::Extension;
use std::{future::Future, sync::Arc};
use tokio::{signal, sync::watch};

/// Coordinates a graceful shutdown between the server, the runner and the `/shutdown` route.
#[derive(Debug, Clone)]
pub struct Shutdown {
	sender: Arc<watch::Sender<bool>>,
	receiver: watch::Receiver<bool>,
}

impl Default for Shutdown {
	fn default() -> Self {
		Self::new()
	}
}

impl Shutdown {
	#[must_use]
	pub fn new() -> Self {
		let (sender, receiver) = watch::channel(false);

		Self {
			sender: Arc::new(sender),
			receiver,
		}
	}

	/// Also shut down on Ctrl+C or SIGTERM.
	#[must_use]
	pub fn with_signals(self) -> Self {
		let shutdown = self.clone();
		tokio::spawn(async move {
			wait_for_signal().await;
			shutdown.start();
		});

		self
	}

	pub fn start(&self) {
		if !self.sender.send_replace(true) {
			tracing::info!("Shutdown requested");
		}
	}

	#[must_use]
	pub fn is_started(&self) -> bool {
		*self.receiver.borrow()
	}

	/// Resolves once a shutdown has been requested.
	pub fn handle(&self) -> impl Future<Output = ()> + Send + 'static {
		let mut receiver = self.receiver.clone();

		async move {
			while !*receiver.borrow_and_update() {
				if receiver.changed().await.is_err() {
					return;
				}
			}
		}
	}

	#[must_use]
	pub fn extension(&self) -> Extension<Self> {
		Extension(self.clone())
	}
}

async fn wait_for_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			tracing::error!("Failed to install Ctrl+C handler: {e}");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
			},
			Err(e) => {
				tracing::error!("Failed to install SIGTERM handler: {e}");
				std::future::pending::<()>().await;
			},
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => {},
		() = terminate => {},
	}

	tracing::info!("Received shutdown signal");
}
