use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use serde::{Deserialize, Serialize};

use crate::{clock::SessionTick, spectrum::SpectralEstimate};

/// Notification published by the pipeline for display layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
    PresenceChanged(bool),
    DisplayBpm(u32),
    ChartSample(f32),
    SignalQuality(f32),
    Spectral(SpectralEstimate),
    SessionTick(SessionTick),
}

/// Creates a bounded observer channel.
pub fn channel(capacity: usize) -> (EventSink, EventStream) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    (EventSink { tx: Some(tx) }, EventStream { rx })
}

/// Publishing half. Never blocks: a full or closed channel drops the event.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<SyncSender<PipelineEvent>>,
}

impl EventSink {
    /// A sink that discards everything.
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Returns `false` if the event was dropped.
    pub fn publish(&self, event: PipelineEvent) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };

        match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::trace!(?event, "observer channel full, dropping event");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Consuming half, drained by the display layer at its own pace.
#[derive(Debug)]
pub struct EventStream {
    rx: Receiver<PipelineEvent>,
}

impl EventStream {
    /// Collects every event currently queued without waiting.
    pub fn drain(&self) -> Vec<PipelineEvent> {
        self.rx.try_iter().collect()
    }

    pub fn try_next(&self) -> Option<PipelineEvent> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_order() {
        let (sink, stream) = channel(4);
        assert!(sink.publish(PipelineEvent::PresenceChanged(true)));
        assert!(sink.publish(PipelineEvent::DisplayBpm(72)));

        assert_eq!(
            stream.drain(),
            vec![
                PipelineEvent::PresenceChanged(true),
                PipelineEvent::DisplayBpm(72)
            ]
        );
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (sink, stream) = channel(1);
        assert!(sink.publish(PipelineEvent::ChartSample(0.5)));
        assert!(!sink.publish(PipelineEvent::ChartSample(0.6)));

        assert_eq!(stream.drain(), vec![PipelineEvent::ChartSample(0.5)]);
    }

    #[test]
    fn closed_or_missing_receiver_is_harmless() {
        let (sink, stream) = channel(2);
        drop(stream);
        assert!(!sink.publish(PipelineEvent::SignalQuality(1.0)));
        assert!(!EventSink::disconnected().publish(PipelineEvent::DisplayBpm(60)));
    }
}
