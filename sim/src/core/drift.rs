//! Weekly KPI drift from adherence, travel, and followed decisions.

use rand::Rng;
use serde::Serialize;

use crate::core::state::{Kpi, Kpis};
use crate::core::types::UpdateKind;

/// Inclusive bounds every KPI is clamped into after drift.
pub fn clamp_range(kpi: Kpi) -> (i32, i32) {
    match kpi {
        Kpi::Hrv => (20, 90),
        Kpi::Vo2max => (25, 60),
        Kpi::CholesterolTotal => (140, 260),
        Kpi::SleepQuality => (40, 85),
        Kpi::StressResilience => (40, 85),
    }
}

pub const LOW_ADHERENCE: f64 = 0.5;
pub const HIGH_ADHERENCE: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    #[serde(rename = "+")]
    Up,
    #[serde(rename = "-")]
    Down,
}

/// Expected effect of a followed decision on one KPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KpiNudge {
    pub kpi: Kpi,
    pub direction: Direction,
}

/// Nudges recorded when the member follows a plan update.
pub fn nudges_for(kind: UpdateKind) -> Vec<KpiNudge> {
    let up = |kpi| KpiNudge {
        kpi,
        direction: Direction::Up,
    };
    match kind {
        UpdateKind::Exercise => vec![up(Kpi::Hrv), up(Kpi::StressResilience)],
        UpdateKind::Diet => vec![KpiNudge {
            kpi: Kpi::CholesterolTotal,
            direction: Direction::Down,
        }],
        UpdateKind::Behavior => vec![up(Kpi::SleepQuality), up(Kpi::StressResilience)],
    }
}

/// Per-KPI change applied by one drift step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KpiDelta {
    pub hrv: i32,
    pub vo2max: i32,
    pub cholesterol_total: i32,
    pub sleep_quality: i32,
    pub stress_resilience: i32,
}

impl KpiDelta {
    fn add(&mut self, kpi: Kpi, amount: i32) {
        let slot = match kpi {
            Kpi::Hrv => &mut self.hrv,
            Kpi::Vo2max => &mut self.vo2max,
            Kpi::CholesterolTotal => &mut self.cholesterol_total,
            Kpi::SleepQuality => &mut self.sleep_quality,
            Kpi::StressResilience => &mut self.stress_resilience,
        };
        *slot += amount;
    }

    fn get(&self, kpi: Kpi) -> i32 {
        match kpi {
            Kpi::Hrv => self.hrv,
            Kpi::Vo2max => self.vo2max,
            Kpi::CholesterolTotal => self.cholesterol_total,
            Kpi::SleepQuality => self.sleep_quality,
            Kpi::StressResilience => self.stress_resilience,
        }
    }
}

/// Apply one week of drift to `kpis` and return the requested delta.
///
/// Low adherence costs HRV and sleep and raises cholesterol; high adherence
/// does the reverse with some randomness. Travel costs sleep and stress
/// resilience. Nudges only move the KPIs they are meaningful for.
pub fn apply_kpi_drift<R: Rng + ?Sized>(
    kpis: &mut Kpis,
    adherence: f64,
    travel_week: bool,
    nudges: &[KpiNudge],
    rng: &mut R,
) -> KpiDelta {
    let mut delta = KpiDelta::default();
    let coin = |rng: &mut R| i32::from(rng.gen_bool(0.5));

    if adherence < LOW_ADHERENCE {
        delta.add(Kpi::Hrv, -1 - coin(rng));
        delta.add(Kpi::SleepQuality, -1);
        delta.add(Kpi::CholesterolTotal, 2 + coin(rng));
    } else if adherence > HIGH_ADHERENCE {
        delta.add(Kpi::Hrv, 1 + coin(rng));
        delta.add(Kpi::Vo2max, coin(rng));
        delta.add(Kpi::CholesterolTotal, -2);
    }

    if travel_week {
        delta.add(Kpi::SleepQuality, -2);
        delta.add(Kpi::StressResilience, -1);
    }

    for nudge in nudges {
        match (nudge.direction, nudge.kpi) {
            (Direction::Up, Kpi::SleepQuality | Kpi::StressResilience | Kpi::Hrv) => {
                delta.add(nudge.kpi, 1);
            }
            (Direction::Down, Kpi::CholesterolTotal) => delta.add(Kpi::CholesterolTotal, -2),
            _ => {}
        }
    }

    for kpi in Kpi::ALL {
        let (lo, hi) = clamp_range(kpi);
        kpis.set(kpi, (kpis.get(kpi) + delta.get(kpi)).clamp(lo, hi));
    }
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn low_adherence_worsens_within_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut kpis = Kpis::default();
        let delta = apply_kpi_drift(&mut kpis, 0.3, false, &[], &mut rng);

        assert!((-2..=-1).contains(&delta.hrv));
        assert_eq!(delta.sleep_quality, -1);
        assert!((2..=3).contains(&delta.cholesterol_total));
        assert_eq!(kpis.hrv, Kpis::default().hrv + delta.hrv);
    }

    #[test]
    fn middle_adherence_and_travel() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut kpis = Kpis::default();
        let delta = apply_kpi_drift(&mut kpis, 0.55, true, &[], &mut rng);

        assert_eq!(
            delta,
            KpiDelta {
                sleep_quality: -2,
                stress_resilience: -1,
                ..KpiDelta::default()
            }
        );
        assert_eq!(kpis.sleep_quality, 58);
    }

    #[test]
    fn nudges_apply_only_to_meaningful_kpis() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut kpis = Kpis::default();
        let mut nudges = nudges_for(UpdateKind::Diet);
        nudges.extend(nudges_for(UpdateKind::Behavior));
        nudges.push(KpiNudge {
            kpi: Kpi::Vo2max,
            direction: Direction::Up,
        });

        let delta = apply_kpi_drift(&mut kpis, 0.5, false, &nudges, &mut rng);

        assert_eq!(delta.cholesterol_total, -2);
        assert_eq!(delta.sleep_quality, 1);
        assert_eq!(delta.stress_resilience, 1);
        assert_eq!(delta.vo2max, 0);
    }

    #[test]
    fn clamps_hold_at_extremes() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut kpis = Kpis {
            hrv: 20,
            vo2max: 25,
            cholesterol_total: 260,
            sleep_quality: 40,
            stress_resilience: 40,
        };
        for _ in 0..10 {
            apply_kpi_drift(&mut kpis, 0.1, true, &[], &mut rng);
        }
        assert_eq!(kpis.hrv, 20);
        assert_eq!(kpis.cholesterol_total, 260);
        assert_eq!(kpis.sleep_quality, 40);
        assert_eq!(kpis.stress_resilience, 40);
    }
}
