//! Translation of fractional slice allocations into shaper commands.

use crate::core::models::{Allocation, RateBurst, ShapingCommand};

/// Calculate a token-bucket burst size from a policing rate.
/// Formula reference: https://nettools.club/cisco_rlc
pub fn calculate_burst(rate: u64) -> u64 {
    ((rate as f64 / 8.0) * 1.5).round() as u64
}

fn rate_burst(fraction: f64, max_bandwidth: u64) -> RateBurst {
    let rate = (fraction * max_bandwidth as f64).round() as u64;
    RateBurst {
        rate,
        burst: calculate_burst(rate),
    }
}

/// Build one shaping command per slice from a fractional allocation, in
/// configured slice order.
pub fn translate_allocation(
    allocation: &Allocation,
    max_downlink_bandwidth: u64,
    max_uplink_bandwidth: u64,
) -> Vec<ShapingCommand> {
    vec![
        ShapingCommand {
            downlink: rate_burst(allocation.downlink.slice1, max_downlink_bandwidth),
            uplink: rate_burst(allocation.uplink.slice1, max_uplink_bandwidth),
        },
        ShapingCommand {
            downlink: rate_burst(allocation.downlink.slice2, max_downlink_bandwidth),
            uplink: rate_burst(allocation.uplink.slice2, max_uplink_bandwidth),
        },
    ]
}

/// Commands disabling policing for `count` slices.
pub fn unlimited_commands(count: usize) -> Vec<ShapingCommand> {
    vec![ShapingCommand::unlimited(); count]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::SliceShare;

    #[test]
    fn test_burst_follows_rate() {
        assert_eq!(calculate_burst(0), 0);
        assert_eq!(calculate_burst(10_000), 1_875);
        assert_eq!(calculate_burst(120_000), 22_500);
        assert_eq!(calculate_burst(400_000), 75_000);
    }

    #[test]
    fn test_burst_rounds_to_nearest() {
        // 30001 / 8 * 1.5 = 5625.1875
        assert_eq!(calculate_burst(30_001), 5_625);
        // 3 / 8 * 1.5 = 0.5625
        assert_eq!(calculate_burst(3), 1);
    }

    #[test]
    fn test_translate_allocation() {
        let allocation = Allocation {
            downlink: SliceShare { slice1: 0.3, slice2: 0.7 },
            uplink: SliceShare { slice1: 0.5, slice2: 0.5 },
        };

        let commands = translate_allocation(&allocation, 400_000, 60_000);

        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].downlink, RateBurst { rate: 120_000, burst: 22_500 });
        assert_eq!(commands[1].downlink, RateBurst { rate: 280_000, burst: 52_500 });
        assert_eq!(commands[0].uplink, RateBurst { rate: 30_000, burst: 5_625 });
        assert_eq!(commands[1].uplink, RateBurst { rate: 30_000, burst: 5_625 });
    }

    #[test]
    fn test_unlimited_commands_disable_policing() {
        let commands = unlimited_commands(2);
        assert_eq!(commands.len(), 2);
        for command in commands {
            assert_eq!(command.downlink, RateBurst { rate: 0, burst: 0 });
            assert_eq!(command.uplink, RateBurst { rate: 0, burst: 0 });
        }
    }
}
