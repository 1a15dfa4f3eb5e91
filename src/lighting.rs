//! LED dome illumination patterns.
//!
//! The MUFF dome carries 24 LEDs in two concentric tiers of 12. Both tiers
//! share the same azimuths, 30 degrees apart, numbered clockwise: LEDs
//! `0..12` are the top tier and LED `k + 12` sits directly below LED `k`.
//!
//! [`plan`] maps a lighting condition `L` out of `nL` conditions to the set of
//! LEDs to switch on. The arithmetic encodes the physical dome geometry and is
//! reproduced exactly; it is not meant to be "simplified".

use std::ops::Index;

/// Number of LEDs on the dome.
pub const NUM_LEDS: usize = 24;

/// LEDs per tier.
pub const TIER_SIZE: usize = 12;

/// Per-LED intensities for the whole dome, each either 0.0 or 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IlluminationVector([f64; NUM_LEDS]);

impl IlluminationVector {
    /// All LEDs off.
    pub fn dark() -> Self {
        Self([0.0; NUM_LEDS])
    }

    /// All LEDs at full intensity.
    pub fn full() -> Self {
        Self([1.0; NUM_LEDS])
    }

    /// Vector with exactly the listed LEDs switched on. Indices past the
    /// dome are ignored.
    pub fn with_lit(indices: &[usize]) -> Self {
        let mut v = Self::dark();
        for &i in indices {
            v.light(i);
        }
        v
    }

    fn light(&mut self, index: usize) {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = 1.0;
        }
    }

    /// Intensity of LED `index`, if it exists.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    /// Indices of the LEDs that are on.
    pub fn lit(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0.0)
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of LEDs that are on.
    pub fn lit_count(&self) -> usize {
        self.0.iter().filter(|&&v| v != 0.0).count()
    }

    /// Iterate over `(index, intensity)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.0.iter().copied().enumerate()
    }

    /// Mutable access used by the device controller to mirror commands.
    pub(crate) fn set(&mut self, index: usize, value: f64) {
        if let Some(slot) = self.0.get_mut(index) {
            *slot = value;
        }
    }
}

impl Default for IlluminationVector {
    fn default() -> Self {
        Self::dark()
    }
}

impl Index<usize> for IlluminationVector {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl From<[f64; NUM_LEDS]> for IlluminationVector {
    fn from(values: [f64; NUM_LEDS]) -> Self {
        Self(values)
    }
}

/// Illumination used while the operator positions the microscope:
/// four top-tier LEDs a quarter turn apart.
pub fn positioning_pattern() -> IlluminationVector {
    IlluminationVector::with_lit(&[0, 3, 6, 9])
}

/// Compute the LEDs to light for condition `light` out of `total` conditions.
///
/// Requires `1 <= total <= 24` and `light < total`; out-of-range input yields
/// an all-dark vector.
pub fn plan(light: usize, total: usize) -> IlluminationVector {
    if total == 0 || total > NUM_LEDS || light >= total {
        return IlluminationVector::dark();
    }

    let mut vals = IlluminationVector::dark();
    if total > TIER_SIZE {
        if light < TIER_SIZE || total == NUM_LEDS {
            // Single LEDs, 30 degrees apart.
            vals.light(light);
        } else {
            // Remaining conditions spread over the bottom tier.
            let lx = ((light - TIER_SIZE) * TIER_SIZE + 6) / (total - TIER_SIZE);
            vals.light(lx + TIER_SIZE);
        }
    } else if total == TIER_SIZE {
        // Same azimuth on both tiers.
        vals.light(light);
        vals.light(light + TIER_SIZE);
    } else if total == 6 {
        centric_pattern(&mut vals, 2 * light);
    } else {
        // Azimuth as a multiple of 15 degrees.
        let slot = (light * 24 + 12) / total;
        debug_assert!(slot < 24);
        if slot % 2 == 0 {
            centric_pattern(&mut vals, slot / 2);
        } else {
            bridging_pattern(&mut vals, (slot - 1) / 2);
        }
    }
    vals
}

/// Six LEDs centred on top-tier LED `lm`: the LED and its two neighbours,
/// the LED below it, and two shadow fillers about 120 degrees away.
fn centric_pattern(vals: &mut IlluminationVector, lm: usize) {
    debug_assert!(lm < TIER_SIZE);
    vals.light(lm);
    vals.light((lm + 1) % TIER_SIZE);
    vals.light((lm + 11) % TIER_SIZE);
    vals.light(lm + TIER_SIZE);
    vals.light((lm + 4) % TIER_SIZE);
    vals.light((lm + 8) % TIER_SIZE);
}

/// Six LEDs centred between top-tier LED `la` and its clockwise neighbour.
fn bridging_pattern(vals: &mut IlluminationVector, la: usize) {
    debug_assert!(la < TIER_SIZE);
    let lb = (la + 1) % TIER_SIZE;
    vals.light(la);
    vals.light(lb);
    vals.light(la + TIER_SIZE);
    vals.light(lb + TIER_SIZE);
    vals.light((lb + 4) % TIER_SIZE);
    vals.light((la + 8) % TIER_SIZE);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected_count(total: usize) -> usize {
        match total {
            13..=24 => 1,
            12 => 2,
            _ => 6,
        }
    }

    #[test]
    fn test_every_condition_lights_expected_count() {
        for total in 1..=NUM_LEDS {
            for light in 0..total {
                let v = plan(light, total);
                assert_eq!(
                    v.lit_count(),
                    expected_count(total),
                    "L={} nL={} lit={:?}",
                    light,
                    total,
                    v.lit()
                );
                for (_, value) in v.iter() {
                    assert!(value == 0.0 || value == 1.0);
                }
            }
        }
    }

    #[test]
    fn test_plan_is_pure() {
        for total in 1..=NUM_LEDS {
            for light in 0..total {
                assert_eq!(plan(light, total), plan(light, total));
            }
        }
    }

    #[test]
    fn test_twenty_four_conditions_light_each_led_once() {
        for light in 0..24 {
            assert_eq!(plan(light, 24).lit(), vec![light]);
        }
    }

    #[test]
    fn test_top_tier_singles_below_twelve() {
        for total in 13..24 {
            for light in 0..12 {
                assert_eq!(plan(light, total).lit(), vec![light]);
            }
        }
    }

    #[test]
    fn test_bottom_tier_spreading() {
        // nL = 13: the only bottom condition sits at ((0*12+6)/1) = 6.
        assert_eq!(plan(12, 13).lit(), vec![18]);

        // nL = 16: four bottom conditions at 1, 4, 7, 10.
        let bottom: Vec<usize> = (12..16).map(|l| plan(l, 16).lit()[0]).collect();
        assert_eq!(bottom, vec![13, 16, 19, 22]);

        // nL = 18: six bottom conditions at 1, 3, 5, 7, 9, 11.
        let bottom: Vec<usize> = (12..18).map(|l| plan(l, 18).lit()[0]).collect();
        assert_eq!(bottom, vec![13, 15, 17, 19, 21, 23]);

        // nL = 23: eleven bottom conditions, bottom LED 5 left out.
        let bottom: Vec<usize> = (12..23).map(|l| plan(l, 23).lit()[0]).collect();
        assert_eq!(bottom, vec![12, 13, 14, 15, 16, 18, 19, 20, 21, 22, 23]);
    }

    #[test]
    fn test_bottom_tier_stays_on_bottom_tier() {
        for total in 13..24 {
            for light in 12..total {
                let lit = plan(light, total).lit();
                assert!(lit[0] >= TIER_SIZE && lit[0] < NUM_LEDS, "L={} nL={}", light, total);
            }
        }
    }

    #[test]
    fn test_twelve_conditions_light_both_tiers() {
        for light in 0..12 {
            assert_eq!(plan(light, 12).lit(), vec![light, light + 12]);
        }
    }

    #[test]
    fn test_six_conditions_use_centric_pattern() {
        assert_eq!(plan(0, 6).lit(), vec![0, 1, 4, 8, 11, 12]);
        assert_eq!(plan(1, 6).lit(), vec![1, 2, 3, 6, 10, 14]);
        assert_eq!(plan(5, 6).lit(), vec![2, 6, 9, 10, 11, 22]);
    }

    #[test]
    fn test_single_condition_is_centric_at_half_slot() {
        // S = 12 / 1 = 12, even, centre 6.
        assert_eq!(plan(0, 1).lit(), vec![2, 5, 6, 7, 10, 18]);
    }

    #[test]
    fn test_odd_slot_uses_bridging_pattern() {
        // nL = 4, L = 0: S = 12 / 4 = 3, bridging between 1 and 2.
        assert_eq!(plan(0, 4).lit(), vec![1, 2, 6, 9, 13, 14]);
        // nL = 8, L = 7: S = 180 / 8 = 22, even, centric at 11.
        assert_eq!(plan(7, 8).lit(), vec![0, 3, 7, 10, 11, 23]);
        // nL = 5, L = 4: S = 108 / 5 = 21, bridging between 10 and 11.
        assert_eq!(plan(4, 5).lit(), vec![3, 6, 10, 11, 22, 23]);
    }

    #[test]
    fn test_bridging_wraps_around_the_tier() {
        // nL = 2, L = 1: S = 36 / 2 = 18, centric at 9.
        assert_eq!(plan(1, 2).lit(), vec![1, 5, 8, 9, 10, 21]);
        // Direct check of the wrap: la = 11, lb = 0.
        let mut v = IlluminationVector::dark();
        bridging_pattern(&mut v, 11);
        assert_eq!(v.lit(), vec![0, 4, 7, 11, 12, 23]);
    }

    #[test]
    fn test_out_of_range_input_is_dark() {
        assert_eq!(plan(0, 0), IlluminationVector::dark());
        assert_eq!(plan(3, 3), IlluminationVector::dark());
        assert_eq!(plan(0, 25), IlluminationVector::dark());
    }

    #[test]
    fn test_positioning_pattern() {
        assert_eq!(positioning_pattern().lit(), vec![0, 3, 6, 9]);
    }
}
