//! Link orchestration for front ends
//!
//! Wraps one [`ObdClient`] and its poll loop. Connect, trouble-code reads and
//! clears all report back through [`LinkEvent`]s so a front end never blocks
//! on the adapter.

use crate::events::{emit, EventSender, LinkEvent};
use crate::scheduler::{PollConfig, PollScheduler, PollSummary};
use obd_protocol::{LinkConfig, ObdClient, ObdError, TroubleCode, VehicleProfile};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct LinkController {
    client: Arc<ObdClient>,
    poll_config: PollConfig,
    events: EventSender,
    scheduler: Mutex<Option<PollScheduler>>,
}

impl LinkController {
    pub fn new(config: LinkConfig, profile: Option<VehicleProfile>, events: EventSender) -> Self {
        let poll_config = PollConfig::from(&config);
        Self::from_client(Arc::new(ObdClient::new(config, profile)), poll_config, events)
    }

    pub fn from_client(
        client: Arc<ObdClient>,
        poll_config: PollConfig,
        events: EventSender,
    ) -> Self {
        Self {
            client,
            poll_config,
            events,
            scheduler: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &Arc<ObdClient> {
        &self.client
    }

    /// Connect and initialize, reporting the outcome as a status event
    pub async fn connect(&self) -> Result<(), ObdError> {
        self.stop_polling().await;

        match self.client.connect().await {
            Ok(result) => {
                self.emit_status(true, result.summary());
                Ok(())
            }
            Err(e) => {
                self.emit_status(false, format!("Connection error: {}", e));
                Err(e)
            }
        }
    }

    /// Connect on a background task, optionally starting the poll loop
    pub fn spawn_connect(
        self: &Arc<Self>,
        start_polling: bool,
    ) -> JoinHandle<Result<(), ObdError>> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.connect().await?;
            if start_polling {
                controller.start_polling().await;
            }
            Ok(())
        })
    }

    /// Start the poll loop; `false` if already polling or not connected
    pub async fn start_polling(&self) -> bool {
        let mut slot = self.scheduler.lock().await;
        if slot.as_ref().is_some_and(|s| !s.is_finished()) {
            debug!("Poll loop already running");
            return false;
        }

        let scheduler = PollScheduler::start(
            Arc::clone(&self.client),
            self.client.profile(),
            self.poll_config.clone(),
            self.events.clone(),
        );
        let started = scheduler.is_some();
        *slot = scheduler;
        started
    }

    /// Stop the poll loop and wait for it to exit
    pub async fn stop_polling(&self) -> Option<PollSummary> {
        let scheduler = self.scheduler.lock().await.take()?;
        Some(scheduler.shutdown().await)
    }

    /// Wait for the poll loop to finish on its own (cycle limit or link loss)
    pub async fn wait_for_polling(&self) -> Option<PollSummary> {
        let scheduler = self.scheduler.lock().await.take()?;
        Some(scheduler.join().await)
    }

    /// Read stored trouble codes and publish them
    pub async fn read_trouble_codes(&self) -> Result<Vec<TroubleCode>, ObdError> {
        match self.client.read_trouble_codes().await {
            Ok(codes) => {
                emit(&self.events, LinkEvent::TroubleCodesProduced(codes.clone()));
                Ok(codes)
            }
            Err(e) => Err(self.report(e)),
        }
    }

    pub async fn clear_trouble_codes(&self) -> Result<(), ObdError> {
        self.client.clear_trouble_codes().await.map_err(|e| self.report(e))
    }

    pub async fn disconnect(&self) {
        self.stop_polling().await;
        self.client.disconnect().await;
        self.emit_status(false, "Disconnected".to_string());
        info!("Link controller disconnected");
    }

    fn report(&self, error: ObdError) -> ObdError {
        if error.is_fatal() {
            warn!("Link lost during on-demand request: {}", error);
            self.emit_status(false, format!("Connection lost: {}", error));
        }
        error
    }

    fn emit_status(&self, success: bool, message: String) {
        emit(
            &self.events,
            LinkEvent::ConnectionStatusChanged { success, message },
        );
    }
}
