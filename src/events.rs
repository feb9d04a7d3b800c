use crate::frame::Frame;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{error, info, trace};

/// Events published by the acquisition worker
#[derive(Debug, Clone)]
pub enum AcquisitionEvent {
    /// Grabbing began on the named device
    Started { device: String, timestamp: SystemTime },
    /// A frame was grabbed
    Frame(Frame),
    /// Smoothed frame rate after the frame with `frame_id`
    Rate { frame_id: u64, fps: f64 },
    /// The run ended because the device failed; the worker is no longer grabbing
    Terminated { error: String, timestamp: SystemTime },
    /// The run ended on request
    Stopped { frames: u64, timestamp: SystemTime },
}

impl AcquisitionEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            AcquisitionEvent::Started { device, .. } => format!("Acquisition started on {}", device),
            AcquisitionEvent::Frame(frame) => {
                format!("Frame {} ({}x{})", frame.id, frame.width, frame.height)
            }
            AcquisitionEvent::Rate { fps, .. } => format!("Frame rate {:.1} fps", fps),
            AcquisitionEvent::Terminated { error, .. } => {
                format!("Acquisition terminated: {}", error)
            }
            AcquisitionEvent::Stopped { frames, .. } => {
                format!("Acquisition stopped after {} frames", frames)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            AcquisitionEvent::Started { .. } => "started",
            AcquisitionEvent::Frame(_) => "frame",
            AcquisitionEvent::Rate { .. } => "rate",
            AcquisitionEvent::Terminated { .. } => "terminated",
            AcquisitionEvent::Stopped { .. } => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AcquisitionEvent::Terminated { .. } | AcquisitionEvent::Stopped { .. }
        )
    }
}

/// Broadcast bus carrying acquisition events to every subscriber.
///
/// Publishing is synchronous so it can be called from the acquisition
/// thread; each receiver observes events in publish order. A receiver that
/// falls more than `capacity` events behind loses the oldest ones and is told
/// so through `RecvError::Lagged`.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AcquisitionEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<AcquisitionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of receivers reached; zero when nobody listens.
    pub fn publish(&self, event: AcquisitionEvent) -> usize {
        match &event {
            AcquisitionEvent::Started { device, .. } => {
                info!("Acquisition started on {}", device);
            }
            AcquisitionEvent::Terminated { error, .. } => {
                error!("Acquisition terminated: {}", error);
            }
            AcquisitionEvent::Stopped { frames, .. } => {
                info!("Acquisition stopped after {} frames", frames);
            }
            _ => trace!("Event: {}", event.description()),
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    #[cfg(test)]
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}
