//! Level calculation from cumulative distance.
//!
//! Levels run 1-10 and are derived purely from the cumulative distance:
//! Lv1: 0km, Lv2: 10km, Lv3: 25km, Lv4: 50km, Lv5: 100km,
//! Lv6: 200km, Lv7: 400km, Lv8: 700km, Lv9: 1000km, Lv10: 1500km.

/// Ascending distance thresholds in kilometers; index i unlocks level i + 1.
pub const DISTANCE_THRESHOLDS: [f64; 10] =
    [0.0, 10.0, 25.0, 50.0, 100.0, 200.0, 400.0, 700.0, 1000.0, 1500.0];

/// Maximum attainable level.
pub const MAX_LEVEL: u8 = 10;

/// Calculate the level for a cumulative distance.
///
/// Thresholds are inclusive: exactly 10.0 km is level 2. Deterministic and
/// total; anything below the first threshold (including a negative total from
/// deletions) is level 1.
pub fn calculate_level(total_distance_km: f64) -> u8 {
    let mut level = 1;
    for (i, threshold) in DISTANCE_THRESHOLDS.iter().enumerate().rev() {
        if total_distance_km >= *threshold {
            level = (i + 1) as u8;
            break;
        }
    }
    level.min(MAX_LEVEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_at_every_threshold_boundary() {
        // Each threshold is inclusive: hitting it exactly grants the level
        for (i, threshold) in DISTANCE_THRESHOLDS.iter().enumerate() {
            assert_eq!(
                calculate_level(*threshold),
                (i + 1) as u8,
                "threshold {} km",
                threshold
            );
        }
    }

    #[test]
    fn test_level_just_below_each_threshold() {
        for (i, threshold) in DISTANCE_THRESHOLDS.iter().enumerate().skip(1) {
            assert_eq!(
                calculate_level(threshold - 0.001),
                i as u8,
                "just below {} km",
                threshold
            );
        }
    }

    #[test]
    fn test_level_is_monotonic() {
        let mut previous = 0;
        let mut distance = 0.0;
        while distance <= 1600.0 {
            let level = calculate_level(distance);
            assert!(level >= previous, "level dropped at {} km", distance);
            previous = level;
            distance += 0.5;
        }
    }

    #[test]
    fn test_level_clamped_to_max() {
        assert_eq!(calculate_level(1500.0), 10);
        assert_eq!(calculate_level(99_999.0), 10);
    }

    #[test]
    fn test_negative_distance_is_level_one() {
        assert_eq!(calculate_level(-3.0), 1);
    }
}
