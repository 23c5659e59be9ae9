//! Compute budget estimation by simulation
//!
//! One representative mint message is simulated without signature checks;
//! the consumed units, scaled by a safety margin, become the ceiling of the
//! whole batch.

use solana_sdk::{
    message::VersionedMessage, signature::Signature, transaction::VersionedTransaction,
};
use tracing::{debug, warn};

use crate::metrics::{metrics, Timer};
use crate::rpc::ChainRpc;

/// Upper bound of compute units per transaction
pub const MAX_COMPUTE_UNITS: u32 = 1_400_000;

/// Ceiling used when simulation gives no usable answer
pub const FALLBACK_COMPUTE_UNITS: u32 = 800_000;

pub const DEFAULT_CU_MARGIN: f64 = 1.2;

/// Wrap a message with placeholder signatures for simulation
pub fn build_sim_tx(message: VersionedMessage) -> VersionedTransaction {
    let signatures = vec![
        Signature::default();
        usize::from(message.header().num_required_signatures)
    ];
    VersionedTransaction {
        signatures,
        message,
    }
}

/// Consumed units scaled by `margin`, capped at [`MAX_COMPUTE_UNITS`]
pub fn apply_margin(units_consumed: u64, margin: f64) -> u32 {
    let scaled = (units_consumed as f64 * margin).ceil();
    if scaled >= f64::from(MAX_COMPUTE_UNITS) {
        MAX_COMPUTE_UNITS
    } else {
        scaled as u32
    }
}

/// Simulate `message` once and derive the batch compute ceiling
///
/// Never fails: simulation errors and missing unit counts fall back to
/// [`FALLBACK_COMPUTE_UNITS`].
pub async fn estimate_compute_units(
    rpc: &dyn ChainRpc,
    message: VersionedMessage,
    margin: f64,
) -> u32 {
    let timer = Timer::new();
    let result = rpc.simulate(&build_sim_tx(message)).await;
    timer.observe_duration(&metrics().simulation_latency);

    match result {
        Ok(report) => match (report.err, report.units_consumed) {
            (None, Some(units)) if units > 0 => {
                let limit = apply_margin(units, margin);
                debug!(units_consumed = units, cu_limit = limit, "Compute units estimated");
                limit
            }
            (Some(err), _) => {
                warn!(
                    error = %err,
                    logs = ?report.logs,
                    fallback = FALLBACK_COMPUTE_UNITS,
                    "Simulation failed, using fallback compute units"
                );
                FALLBACK_COMPUTE_UNITS
            }
            (None, _) => {
                warn!(
                    fallback = FALLBACK_COMPUTE_UNITS,
                    "Simulation returned no unit count, using fallback compute units"
                );
                FALLBACK_COMPUTE_UNITS
            }
        },
        Err(err) => {
            warn!(
                error = %err,
                fallback = FALLBACK_COMPUTE_UNITS,
                "Simulation request failed, using fallback compute units"
            );
            FALLBACK_COMPUTE_UNITS
        }
    }
}
