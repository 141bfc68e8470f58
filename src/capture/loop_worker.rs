use std::sync::Arc;

use log::{error, info};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::decode::{FrameDecoder, FrameGate};
use crate::models::DecodedPayload;

use super::source::FrameSource;

const SAMPLE_INTERVAL_MS: u64 = 33;
const CHANGE_THRESHOLD: u32 = 8;
const RECHECK_COOLDOWN_MS: u64 = 750;

#[derive(Debug, Clone)]
pub struct ScanLoopConfig {
    /// Tick cadence of the sampling loop.
    pub sample_interval: Duration,
    /// Frame-gate hash distance below which a frame counts as unchanged.
    /// 0 disables the gate.
    pub change_threshold: u32,
    /// How long an unchanged scene is skipped before it is rechecked.
    pub recheck_cooldown: Duration,
}

impl Default for ScanLoopConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_millis(SAMPLE_INTERVAL_MS),
            change_threshold: CHANGE_THRESHOLD,
            recheck_cooldown: Duration::from_millis(RECHECK_COOLDOWN_MS),
        }
    }
}

/// How a scan loop ended. The controller reacts differently to each: a
/// decoded payload enters the submission handshake, a cancellation is the
/// operator's own doing, and a device failure must be reported to them.
pub enum ScanEnd {
    Decoded(DecodedPayload),
    Cancelled,
    DeviceFailed,
}

/// Drives decode attempts against a live frame source until the first match,
/// cancellation, or a device failure.
///
/// Attempts are strictly sequential: the next tick's attempt only starts
/// after the previous one has resolved to a match or a miss. The source
/// handle is released when this function returns.
pub async fn scan_loop(
    session_id: String,
    mut source: Box<dyn FrameSource>,
    decoder: Arc<dyn FrameDecoder>,
    config: ScanLoopConfig,
    cancel_token: CancellationToken,
) -> ScanEnd {
    let mut ticker = tokio::time::interval(config.sample_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut gate = FrameGate::new(config.change_threshold, config.recheck_cooldown);
    let mut attempts: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let frame = tokio::select! {
                    result = source.next_frame() => match result {
                        Ok(frame) => frame,
                        Err(err) => {
                            error!("frame capture failed for session {session_id}: {err:?}");
                            return ScanEnd::DeviceFailed;
                        }
                    },
                    _ = cancel_token.cancelled() => {
                        info!("scan loop for session {session_id} cancelled while awaiting a frame");
                        return ScanEnd::Cancelled;
                    }
                };

                if !gate.should_attempt(&frame) {
                    continue;
                }

                attempts += 1;
                let decode = tokio::task::spawn_blocking({
                    let decoder = Arc::clone(&decoder);
                    move || decoder.decode(&frame)
                });

                tokio::select! {
                    joined = decode => match joined {
                        Ok(Some(text)) => {
                            info!(
                                "decoded payload on attempt {attempts} for session {session_id}"
                            );
                            return ScanEnd::Decoded(DecodedPayload::new(text));
                        }
                        Ok(None) => {
                            // Miss. Silent, retried on the next tick.
                        }
                        Err(err) => {
                            error!("decode worker join failed for session {session_id}: {err}");
                        }
                    },
                    _ = cancel_token.cancelled() => {
                        info!("scan loop for session {session_id} cancelled mid-attempt");
                        return ScanEnd::Cancelled;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!("scan loop shutting down for session {session_id}");
                return ScanEnd::Cancelled;
            }
        }
    }
}
