//! Device link lifecycle: connect and disconnect the two Arduinos.
//!
//! Exactly one read loop runs per connected device. Connecting opens the
//! endpoint, spawns the loop, and hands out a fresh cancel flag; closing a
//! connection flips the flag, which the loop observes at its next
//! suspension point. A failed open surfaces to the caller and leaves the
//! link in `Error` — retry is manual, never automatic.

use std::sync::Arc;

use tokio::sync::{watch, Mutex, RwLock};
use tracing::info;

use crate::db::Db;
use crate::pump::{self, PumpSlot};
use crate::sensor;
use crate::state::{now_ms, ConnectionState, EventKind, SharedState};
use crate::transport::{self, Endpoint, TransportError};

pub struct LinkManager {
    shared: SharedState,
    db: Option<Db>,
    pump_slot: PumpSlot,
    sensor_endpoint: Option<Endpoint>,
    pump_endpoint: Option<Endpoint>,
    sensor_cancel: Mutex<Option<watch::Sender<bool>>>,
    pump_cancel: Mutex<Option<watch::Sender<bool>>>,
}

impl LinkManager {
    pub fn new(
        shared: SharedState,
        db: Option<Db>,
        sensor_endpoint: Option<Endpoint>,
        pump_endpoint: Option<Endpoint>,
    ) -> Arc<Self> {
        Arc::new(Self {
            shared,
            db,
            pump_slot: Arc::new(RwLock::new(None)),
            sensor_endpoint,
            pump_endpoint,
            sensor_cancel: Mutex::new(None),
            pump_cancel: Mutex::new(None),
        })
    }

    pub fn pump_slot(&self) -> PumpSlot {
        Arc::clone(&self.pump_slot)
    }

    // -- Sensor link ---------------------------------------------------------

    pub async fn connect_sensors(&self) -> Result<(), TransportError> {
        let endpoint = self
            .sensor_endpoint
            .clone()
            .ok_or_else(|| TransportError::Unavailable("no sensor endpoint configured".into()))?;

        {
            let mut st = self.shared.write().await;
            st.sensor_link.state = ConnectionState::Connecting;
            st.sensor_link.detail = Some(endpoint.describe());
        }

        let (reader, _writer) = match transport::open(&endpoint).await {
            Ok(halves) => halves,
            Err(e) => {
                let mut st = self.shared.write().await;
                st.sensor_link.state = ConnectionState::Error;
                st.sensor_link.detail = Some(e.to_string());
                st.record_event(EventKind::Error, format!("sensor connect failed: {e}"));
                return Err(e);
            }
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);
        *self.sensor_cancel.lock().await = Some(cancel_tx);

        tokio::spawn(sensor::run_sensor_loop(
            reader,
            Arc::clone(&self.shared),
            self.db.clone(),
            self.pump_slot(),
            cancel_rx,
        ));

        let mut st = self.shared.write().await;
        st.sensor_link.state = ConnectionState::Connected;
        st.sensor_link.detail = Some(endpoint.describe());
        st.record_event(
            EventKind::System,
            format!("sensors connected ({})", endpoint.describe()),
        );
        info!(endpoint = %endpoint.describe(), "sensor link up");
        Ok(())
    }

    pub async fn disconnect_sensors(&self) {
        if let Some(cancel) = self.sensor_cancel.lock().await.take() {
            let _ = cancel.send(true);
        }
        let mut st = self.shared.write().await;
        st.sensor_link.state = ConnectionState::Disconnected;
        st.sensor_link.last_rx_ms = None;
    }

    // -- Pump link -----------------------------------------------------------

    pub async fn connect_pump(&self) -> Result<(), TransportError> {
        let endpoint = self
            .pump_endpoint
            .clone()
            .ok_or_else(|| TransportError::Unavailable("no pump endpoint configured".into()))?;

        {
            let mut st = self.shared.write().await;
            st.pump_link.state = ConnectionState::Connecting;
            st.pump_link.detail = Some(endpoint.describe());
        }

        let (reader, writer) = match transport::open(&endpoint).await {
            Ok(halves) => halves,
            Err(e) => {
                let mut st = self.shared.write().await;
                st.pump_link.state = ConnectionState::Error;
                st.pump_link.detail = Some(e.to_string());
                st.record_event(EventKind::Error, format!("pump connect failed: {e}"));
                return Err(e);
            }
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);
        *self.pump_cancel.lock().await = Some(cancel_tx);

        // The pump task performs the forced-OFF safety handshake and flips
        // the link to Connected itself once ready.
        let handle = pump::spawn(reader, writer, Arc::clone(&self.shared), cancel_rx);
        *self.pump_slot.write().await = Some(handle);

        info!(endpoint = %endpoint.describe(), "pump link opening");
        Ok(())
    }

    pub async fn disconnect_pump(&self) {
        if let Some(cancel) = self.pump_cancel.lock().await.take() {
            let _ = cancel.send(true);
        }
        *self.pump_slot.write().await = None;
        let mut st = self.shared.write().await;
        st.pump_link.state = ConnectionState::Disconnected;
        st.pump_link.last_rx_ms = None;
        st.pump.intended = false;
        st.pump.confirmed_by_device = false;
        st.notify(
            None,
            crate::evaluate::Severity::Warning,
            "Pump Arduino disconnected".to_string(),
            now_ms(),
        );
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SystemState;
    use crate::thresholds::Thresholds;

    #[tokio::test]
    async fn connect_without_endpoint_is_unavailable() {
        let shared = SystemState::shared(Thresholds::default());
        let links = LinkManager::new(shared.clone(), None, None, None);

        assert!(matches!(
            links.connect_sensors().await,
            Err(TransportError::Unavailable(_))
        ));
        assert!(matches!(
            links.connect_pump().await,
            Err(TransportError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn failed_open_marks_link_error() {
        let shared = SystemState::shared(Thresholds::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let links = LinkManager::new(
            shared.clone(),
            None,
            Some(Endpoint::Tcp {
                addr: addr.to_string(),
            }),
            None,
        );

        assert!(links.connect_sensors().await.is_err());
        let st = shared.read().await;
        assert_eq!(st.sensor_link.state, ConnectionState::Error);
    }

    #[tokio::test]
    async fn sensor_connect_and_disconnect_over_tcp() {
        let shared = SystemState::shared(Thresholds::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let links = LinkManager::new(
            shared.clone(),
            None,
            Some(Endpoint::Tcp {
                addr: addr.to_string(),
            }),
            None,
        );

        links.connect_sensors().await.unwrap();
        let _conn = accept.await.unwrap();
        assert_eq!(
            shared.read().await.sensor_link.state,
            ConnectionState::Connected
        );

        links.disconnect_sensors().await;
        // Give the loop a moment to observe the cancel flag.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(
            shared.read().await.sensor_link.state,
            ConnectionState::Disconnected
        );
    }

    #[tokio::test]
    async fn pump_disconnect_clears_handle_and_state() {
        let shared = SystemState::shared(Thresholds::default());
        let links = LinkManager::new(shared.clone(), None, None, None);
        {
            let mut st = shared.write().await;
            st.pump.intended = true;
            st.pump.confirmed_by_device = true;
        }

        links.disconnect_pump().await;

        assert!(links.pump_slot().read().await.is_none());
        let st = shared.read().await;
        assert!(!st.pump.intended);
        assert_eq!(st.pump_link.state, ConnectionState::Disconnected);
    }
}
