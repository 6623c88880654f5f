//! # Read and Send Loops
//!
//! Drives the runtime object graph: one read loop per meter and one send
//! loop per channel, all as tokio tasks fed a shared stop signal through a
//! `watch` channel. The loops are independent; a channel whose collector
//! fails permanently is disabled without touching its siblings.
//!
//! Shutdown is explicit about data: every surviving channel gets one final
//! best-effort send cycle, and whatever still cannot be delivered is
//! counted and logged rather than silently dropped. The same task code
//! runs on a multi-thread or a current-thread runtime; the transmission
//! protocol does not change with the scheduling mode.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::api::SendError;
use crate::logging::{log_debug, log_error, log_info, log_warn};
use crate::registry::{ChannelSender, MeterGroup, Registry};
use crate::transmit::CycleOutcome;

/// Pause after an empty or failed poll of a continuously-read device.
const CONTINUOUS_IDLE: Duration = Duration::from_millis(50);

/// Running read and send tasks plus the stop signal that ends them.
pub struct Scheduler {
    stop_tx: watch::Sender<bool>,
    read_tasks: Vec<JoinHandle<()>>,
    send_tasks: Vec<JoinHandle<Option<ChannelSender>>>,
}

impl Scheduler {
    /// Takes the registry apart and spawns every loop on the current
    /// runtime.
    pub fn start(registry: Registry) -> Scheduler {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (groups, senders) = registry.into_parts();

        let read_tasks = groups
            .into_iter()
            .map(|group| tokio::spawn(read_loop(group, stop_rx.clone())))
            .collect();
        let send_tasks = senders
            .into_iter()
            .map(|sender| tokio::spawn(send_loop(sender, stop_rx.clone())))
            .collect();

        Scheduler {
            stop_tx,
            read_tasks,
            send_tasks,
        }
    }

    /// Stops every loop, waits for them, and runs the final flush cycle on
    /// each channel that is still healthy.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);

        for task in self.read_tasks {
            if let Err(e) = task.await {
                log_warn(&format!("Read loop ended abnormally: {e}"));
            }
        }
        for task in self.send_tasks {
            match task.await {
                Ok(Some(mut sender)) => flush_channel(&mut sender).await,
                // Disabled channels already logged what they dropped.
                Ok(None) => {}
                Err(e) => log_warn(&format!("Send loop ended abnormally: {e}")),
            }
        }
        log_info("Scheduler stopped");
    }
}

async fn read_loop(mut group: MeterGroup, mut stop: watch::Receiver<bool>) {
    if let Err(e) = group.open().await {
        log_error(&format!("Meter {}: open failed: {e}", group.name()));
        return;
    }

    if group.allow_interval() {
        let mut ticker = interval(Duration::from_secs(group.interval_secs()));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = group.read_once().await {
                        log_warn(&format!("Meter {}: read failed: {e}", group.name()));
                    }
                }
                _ = stop.changed() => break,
            }
        }
    } else {
        // The device pushes on its own schedule; poll back-to-back and let
        // the driver's timeout pace the loop.
        loop {
            tokio::select! {
                result = group.read_once() => {
                    match result {
                        Ok(0) => tokio::time::sleep(CONTINUOUS_IDLE).await,
                        Ok(_) => {}
                        Err(e) => {
                            log_warn(&format!("Meter {}: read failed: {e}", group.name()));
                            tokio::time::sleep(CONTINUOUS_IDLE).await;
                        }
                    }
                }
                _ = stop.changed() => break,
            }
        }
    }

    if let Err(e) = group.close().await {
        log_warn(&format!("Meter {}: close failed: {e}", group.name()));
    }
    log_debug(&format!("Meter {}: read loop stopped", group.name()));
}

/// Runs one channel's send loop until stopped or permanently failed.
///
/// Returns the sender for the shutdown flush, or `None` when the channel
/// was disabled and has nothing more to offer.
async fn send_loop(
    mut sender: ChannelSender,
    mut stop: watch::Receiver<bool>,
) -> Option<ChannelSender> {
    let name = sender.transmitter.channel().name().to_string();

    match sender.transmitter.register().await {
        Ok(()) => {}
        Err(SendError::Permanent(msg)) => {
            log_error(&format!(
                "Channel {name}: registration rejected, channel disabled: {msg}"
            ));
            return None;
        }
        Err(e) => {
            // Transient; the send cycles will keep the data until the
            // collector comes back.
            log_warn(&format!("Channel {name}: registration failed: {e}"));
        }
    }

    let mut ticker = interval(Duration::from_secs(sender.send_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sender.transmitter.send_cycle().await {
                    CycleOutcome::Idle => {}
                    CycleOutcome::Sent(n) => {
                        log_debug(&format!("Channel {name}: sent {n} readings"));
                    }
                    CycleOutcome::Retry => {
                        log_warn(&format!("Channel {name}: send failed, batch stays pending"));
                    }
                    CycleOutcome::Conflict => {
                        log_warn(&format!(
                            "Channel {name}: collector reported a duplicate, reading dropped"
                        ));
                    }
                    CycleOutcome::Failed(msg) => {
                        let pending = sender.transmitter.channel().buffer().len();
                        log_error(&format!(
                            "Channel {name}: permanent failure, channel disabled \
                             ({pending} pending readings will not be delivered): {msg}"
                        ));
                        return None;
                    }
                }
            }
            _ = stop.changed() => break,
        }
    }
    Some(sender)
}

/// One last send cycle at shutdown, with the outcome spelled out.
async fn flush_channel(sender: &mut ChannelSender) {
    let name = sender.transmitter.channel().name().to_string();
    match sender.transmitter.send_cycle().await {
        CycleOutcome::Idle => log_info(&format!("Channel {name}: nothing pending at shutdown")),
        CycleOutcome::Sent(n) => {
            log_info(&format!("Channel {name}: flushed {n} readings at shutdown"));
        }
        _ => {
            let pending = sender.transmitter.channel().buffer().len();
            log_warn(&format!(
                "Channel {name}: {pending} readings left unsent at shutdown"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::api::mock::MockCollector;
    use crate::buffer::BufferConfig;
    use crate::channel::Channel;
    use crate::meter::mock::MockMeter;
    use crate::reading::{Reading, ReadingIdentifier, ReadingTime};
    use crate::transmit::{AggregationSettings, Transmitter};

    fn demo_channel() -> Arc<Channel> {
        Arc::new(Channel::new(
            "chn0",
            "u-0",
            ReadingIdentifier::Nil,
            false,
            BufferConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_reads_and_sends_end_to_end() {
        let meter = MockMeter::new();
        meter.queue_batch(vec![Reading::new(
            42.0,
            ReadingTime::from_secs(5),
            ReadingIdentifier::Nil,
        )]);

        let channel = demo_channel();
        let collector = MockCollector::new();
        let sent = Arc::clone(&collector.sent_batches);

        let group = MeterGroup::new("mtr0", Box::new(meter), 60, vec![Arc::clone(&channel)]);
        let transmitter = Transmitter::new(
            Arc::clone(&channel),
            Box::new(collector),
            None,
            AggregationSettings::default(),
        );
        let registry = Registry::new(
            vec![group],
            vec![ChannelSender {
                transmitter,
                send_interval_secs: 60,
            }],
        );

        // First interval ticks fire immediately, so one read and at least
        // one send cycle happen right away.
        let scheduler = Scheduler::start(registry);
        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.shutdown().await;

        let batches = sent.lock().unwrap();
        let tuples: Vec<(i64, f64)> = batches.iter().flatten().cloned().collect();
        assert_eq!(tuples, vec![(5_000, 42.0)]);
    }

    /// Tests that a push-style meter is read continuously rather than on
    /// the group interval, and that the stop signal ends the polling loop.
    #[tokio::test]
    async fn test_continuous_meter_ships_readings_and_stops() {
        let meter = MockMeter::new_continuous();
        meter.queue_batch(vec![Reading::new(
            3.5,
            ReadingTime::from_secs(12),
            ReadingIdentifier::Nil,
        )]);

        let channel = demo_channel();
        let collector = MockCollector::new();
        let sent = Arc::clone(&collector.sent_batches);

        let group = MeterGroup::new("mtr0", Box::new(meter), 3600, vec![Arc::clone(&channel)]);
        let transmitter = Transmitter::new(
            Arc::clone(&channel),
            Box::new(collector),
            None,
            AggregationSettings::default(),
        );
        let registry = Registry::new(
            vec![group],
            vec![ChannelSender {
                transmitter,
                send_interval_secs: 3600,
            }],
        );

        let scheduler = Scheduler::start(registry);
        tokio::time::sleep(Duration::from_millis(200)).await;

        // The loop alternates back-to-back polls with idle backoffs once
        // the queue is drained; the stop signal must end it promptly from
        // either state. The reading arrives via the immediate first send
        // tick or the shutdown flush, whichever runs after the poll.
        tokio::time::timeout(Duration::from_secs(5), scheduler.shutdown())
            .await
            .expect("continuous read loop did not stop");

        let batches = sent.lock().unwrap();
        let tuples: Vec<(i64, f64)> = batches.iter().flatten().cloned().collect();
        assert_eq!(tuples, vec![(12_000, 3.5)]);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending_readings() {
        let channel = demo_channel();
        let collector = MockCollector::new();
        let sent = Arc::clone(&collector.sent_batches);

        let transmitter = Transmitter::new(
            Arc::clone(&channel),
            Box::new(collector),
            None,
            AggregationSettings::default(),
        );
        let registry = Registry::new(
            vec![],
            vec![ChannelSender {
                transmitter,
                // Far enough out that only the immediate first tick runs
                // before shutdown.
                send_interval_secs: 3600,
            }],
        );

        let scheduler = Scheduler::start(registry);
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Arrives after the first (empty) cycle; only the shutdown flush
        // can deliver it.
        channel
            .buffer()
            .push(Reading::new(
                7.0,
                ReadingTime::from_secs(9),
                ReadingIdentifier::Nil,
            ))
            .unwrap();

        scheduler.shutdown().await;

        let batches = sent.lock().unwrap();
        let tuples: Vec<(i64, f64)> = batches.iter().flatten().cloned().collect();
        assert_eq!(tuples, vec![(9_000, 7.0)]);
    }

    #[tokio::test]
    async fn test_permanent_registration_failure_disables_channel() {
        let channel = demo_channel();
        let collector = MockCollector::new();
        collector.queue_register_outcome(Err(SendError::Permanent("bad token".into())));
        let sent = Arc::clone(&collector.sent_batches);

        channel
            .buffer()
            .push(Reading::new(
                1.0,
                ReadingTime::from_secs(1),
                ReadingIdentifier::Nil,
            ))
            .unwrap();

        let transmitter = Transmitter::new(
            Arc::clone(&channel),
            Box::new(collector),
            None,
            AggregationSettings::default(),
        );
        let registry = Registry::new(
            vec![],
            vec![ChannelSender {
                transmitter,
                send_interval_secs: 1,
            }],
        );

        let scheduler = Scheduler::start(registry);
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.shutdown().await;

        // Disabled before the first cycle; nothing was sent, not even the
        // shutdown flush.
        assert!(sent.lock().unwrap().is_empty());
    }
}
