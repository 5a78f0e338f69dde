//! The shared aircraft context
//!
//! One struct holds every sample collection plus the traffic set. It is
//! built once at startup: each decoder registers the sample kinds it
//! provides and gets back fixed slot indices, so collection lengths never
//! change after setup. Updates then replace a slot wholesale.
//!
//! Air data a source leaves out (TAS or IAS, density altitude, wind) is
//! derived on the way in from the other collections.

use crate::decoder::{SampleKind, TelemetryUpdate};
use crate::model::{
    AirSample, AttitudeSample, EngineSample, FieldMask, FieldSource, FuelSample, GpsSample,
    NavSample,
};
use crate::navmath;
use crate::targets::{OwnshipFix, TargetSet};
use crate::units::wrap_360;
use serde_json::{json, Map, Value};
use tracing::warn;

/// Slot indices assigned to one decoder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleSlots {
    pub attitude: Option<usize>,
    pub air: Option<usize>,
    pub gps: Option<usize>,
    pub nav: Option<usize>,
    pub engine: Option<usize>,
    pub fuel: Option<usize>,
    pub traffic: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Aircraft {
    pub attitude: Vec<AttitudeSample>,
    pub air: Vec<AirSample>,
    pub gps: Vec<GpsSample>,
    pub nav: Vec<NavSample>,
    pub engine: Vec<EngineSample>,
    pub fuel: Vec<FuelSample>,
    pub targets: TargetSet,
}

/// The slots one applied batch touched, read back after applying
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AircraftDelta {
    pub attitude: Option<(usize, AttitudeSample)>,
    pub air: Option<(usize, AirSample)>,
    pub gps: Option<(usize, GpsSample)>,
    pub nav: Option<(usize, NavSample)>,
    pub engine: Option<(usize, EngineSample)>,
    pub fuel: Option<(usize, FuelSample)>,
    /// Set when the batch carried traffic
    pub target_count: Option<usize>,
}

impl AircraftDelta {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Touched groups only, each as its filtered fields plus `slot`
    pub fn to_json_filtered(&self, mask: Option<&FieldMask>) -> Value {
        fn entry<T: FieldSource>(
            map: &mut Map<String, Value>,
            name: &str,
            sample: &Option<(usize, T)>,
            mask: Option<&FieldMask>,
        ) {
            if let Some((slot, s)) = sample {
                let mut v = s.to_json_filtered(mask);
                if let Value::Object(fields) = &mut v {
                    fields.insert("slot".to_string(), json!(slot));
                }
                map.insert(name.to_string(), v);
            }
        }

        let mut map = Map::new();
        entry(&mut map, "attitude", &self.attitude, mask);
        entry(&mut map, "air", &self.air, mask);
        entry(&mut map, "gps", &self.gps, mask);
        entry(&mut map, "nav", &self.nav, mask);
        entry(&mut map, "engine", &self.engine, mask);
        entry(&mut map, "fuel", &self.fuel, mask);
        if let Some(count) = self.target_count {
            map.insert("target_count".to_string(), json!(count));
        }
        Value::Object(map)
    }
}

fn push_slot<T: Default>(v: &mut Vec<T>) -> Option<usize> {
    v.push(T::default());
    Some(v.len() - 1)
}

impl Aircraft {
    pub fn new(ignore_radius_mi: f64) -> Self {
        Self {
            targets: TargetSet::new(ignore_radius_mi),
            ..Default::default()
        }
    }

    /// Reserve one slot per provided kind
    pub fn register(&mut self, provides: &[SampleKind]) -> SampleSlots {
        let mut slots = SampleSlots::default();
        for kind in provides {
            match kind {
                SampleKind::Attitude => slots.attitude = push_slot(&mut self.attitude),
                SampleKind::Air => slots.air = push_slot(&mut self.air),
                SampleKind::Gps => slots.gps = push_slot(&mut self.gps),
                SampleKind::Nav => slots.nav = push_slot(&mut self.nav),
                SampleKind::Engine => slots.engine = push_slot(&mut self.engine),
                SampleKind::Fuel => slots.fuel = push_slot(&mut self.fuel),
                SampleKind::Traffic => slots.traffic = true,
            }
        }
        slots
    }

    /// Apply one decoder update. Updates for kinds the decoder never
    /// registered are dropped.
    pub fn apply(&mut self, slots: &SampleSlots, update: TelemetryUpdate) {
        fn put<T>(v: &mut [T], slot: Option<usize>, value: T) -> bool {
            match slot.and_then(|i| v.get_mut(i)) {
                Some(s) => {
                    *s = value;
                    true
                }
                None => false,
            }
        }

        let kind = update.kind();
        let stored = match update {
            TelemetryUpdate::Attitude(s) => put(&mut self.attitude, slots.attitude, s),
            TelemetryUpdate::Air(mut s) => {
                self.derive_air(&mut s);
                put(&mut self.air, slots.air, s)
            }
            TelemetryUpdate::Gps(s) => put(&mut self.gps, slots.gps, s),
            TelemetryUpdate::Nav(s) => put(&mut self.nav, slots.nav, s),
            TelemetryUpdate::Engine(s) => put(&mut self.engine, slots.engine, s),
            TelemetryUpdate::Fuel(s) => put(&mut self.fuel, slots.fuel, s),
            TelemetryUpdate::Target(t) => {
                if slots.traffic {
                    let own = self.ownship();
                    self.targets.add_or_update(t, &own);
                }
                slots.traffic
            }
        };
        if !stored {
            warn!(?kind, "update for unregistered sample kind dropped");
        }
    }

    /// Fill in air data the source did not send. OAT falls back to ISA.
    /// Wind needs TAS, an IMU heading and a GPS ground vector.
    fn derive_air(&self, air: &mut AirSample) {
        if let Some(palt) = air.pressure_alt {
            let oat = air.oat.unwrap_or_else(|| navmath::standard_temp_f(palt));
            match (air.ias, air.tas) {
                (Some(ias), None) => air.tas = Some(navmath::ias_to_tas(ias, palt, oat)),
                (None, Some(tas)) => air.ias = Some(navmath::tas_to_ias(tas, palt, oat)),
                _ => {}
            }
            if air.density_alt.is_none() {
                air.density_alt = Some(navmath::density_altitude(palt, oat));
            }
        }

        if air.wind_dir.is_some() || air.wind_speed.is_some() {
            return;
        }
        let own = self.ownship();
        // IMU heading is magnetic, the wind triangle wants true
        let decl = self.gps.iter().find_map(|g| g.mag_decl).unwrap_or(0.0);
        if let (Some(trk), Some(gs), Some(hdg), Some(tas)) =
            (own.ground_track, own.ground_speed, own.mag_heading, air.tas)
        {
            if let Some((dir, speed)) = navmath::wind_triangle(trk, gs, wrap_360(hdg + decl), tas) {
                air.wind_dir = Some(dir);
                air.wind_speed = Some(speed);
            }
        }
    }

    /// Read back the slots `kinds` map to, after a batch was applied
    pub fn delta(&self, slots: &SampleSlots, kinds: &[SampleKind]) -> AircraftDelta {
        fn pick<T: Clone>(v: &[T], slot: Option<usize>) -> Option<(usize, T)> {
            let i = slot?;
            v.get(i).map(|s| (i, s.clone()))
        }

        let mut d = AircraftDelta::default();
        for kind in kinds {
            match kind {
                SampleKind::Attitude => d.attitude = pick(&self.attitude, slots.attitude),
                SampleKind::Air => d.air = pick(&self.air, slots.air),
                SampleKind::Gps => d.gps = pick(&self.gps, slots.gps),
                SampleKind::Nav => d.nav = pick(&self.nav, slots.nav),
                SampleKind::Engine => d.engine = pick(&self.engine, slots.engine),
                SampleKind::Fuel => d.fuel = pick(&self.fuel, slots.fuel),
                SampleKind::Traffic if slots.traffic => d.target_count = Some(self.targets.count()),
                SampleKind::Traffic => {}
            }
        }
        d
    }

    /// Own-ship reference from the first GPS with a position, the first
    /// air sample with an airspeed and the first IMU heading
    pub fn ownship(&self) -> OwnshipFix {
        let gps = self
            .gps
            .iter()
            .find(|g| g.lat.is_some() && g.lon.is_some());
        OwnshipFix {
            lat: gps.and_then(|g| g.lat),
            lon: gps.and_then(|g| g.lon),
            alt: gps
                .and_then(|g| g.alt)
                .or_else(|| self.air.iter().find_map(|a| a.alt)),
            ground_track: gps.and_then(|g| g.ground_track),
            ground_speed: gps.and_then(|g| g.ground_speed),
            airspeed: self.air.iter().find_map(|a| a.ias),
            mag_heading: self.attitude.iter().find_map(|a| a.heading),
        }
    }

    /// Aged-out target sweep against the current own-ship
    pub fn clean_up(&mut self, now: i64) {
        let own = self.ownship();
        self.targets.clean_up(now, &own);
    }

    /// Every sample, filtered by `mask`, grouped by collection
    pub fn to_json_filtered(&self, mask: Option<&FieldMask>) -> Value {
        fn group<T: FieldSource>(v: &[T], mask: Option<&FieldMask>) -> Value {
            Value::Array(v.iter().map(|s| s.to_json_filtered(mask)).collect())
        }
        json!({
            "attitude": group(&self.attitude, mask),
            "air": group(&self.air, mask),
            "gps": group(&self.gps, mask),
            "nav": group(&self.nav, mask),
            "engine": group(&self.engine, mask),
            "fuel": group(&self.fuel, mask),
            "target_count": self.targets.count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Target;

    #[test]
    fn test_register_assigns_distinct_slots() {
        let mut ac = Aircraft::new(30.0);
        let a = ac.register(&[SampleKind::Attitude, SampleKind::Air]);
        let b = ac.register(&[SampleKind::Attitude, SampleKind::Gps]);
        assert_eq!(a.attitude, Some(0));
        assert_eq!(b.attitude, Some(1));
        assert_eq!(b.gps, Some(0));
        assert_eq!(ac.attitude.len(), 2);
        assert!(a.nav.is_none());
    }

    #[test]
    fn test_apply_replaces_slot_without_growing() {
        let mut ac = Aircraft::new(30.0);
        let slots = ac.register(&[SampleKind::Attitude]);
        for pitch in [1.0, 2.0, 3.0] {
            ac.apply(
                &slots,
                TelemetryUpdate::Attitude(AttitudeSample {
                    pitch: Some(pitch),
                    ..Default::default()
                }),
            );
        }
        assert_eq!(ac.attitude.len(), 1);
        assert_eq!(ac.attitude[0].pitch, Some(3.0));
    }

    #[test]
    fn test_unregistered_kind_dropped() {
        let mut ac = Aircraft::new(30.0);
        let slots = ac.register(&[SampleKind::Air]);
        ac.apply(&slots, TelemetryUpdate::Gps(GpsSample::default()));
        assert!(ac.gps.is_empty());
    }

    #[test]
    fn test_target_update_uses_ownship() {
        let mut ac = Aircraft::new(30.0);
        let slots = ac.register(&[SampleKind::Gps, SampleKind::Traffic]);
        ac.apply(
            &slots,
            TelemetryUpdate::Gps(GpsSample {
                lat: Some(37.0),
                lon: Some(-122.0),
                alt: Some(1000.0),
                ..Default::default()
            }),
        );
        let t = Target {
            lat: Some(37.05),
            lon: Some(-122.0),
            alt: Some(1500.0),
            ..Target::new(0xA1B2C3, 0)
        };
        ac.apply(&slots, TelemetryUpdate::Target(t));
        assert_eq!(ac.targets.count(), 1);
        assert_eq!(ac.targets.targets()[0].alt_diff, Some(500.0));
    }

    #[test]
    fn test_ownship_prefers_first_gps_with_position() {
        let mut ac = Aircraft::new(30.0);
        ac.register(&[SampleKind::Gps]);
        ac.register(&[SampleKind::Gps, SampleKind::Attitude]);
        ac.gps[1].lat = Some(10.0);
        ac.gps[1].lon = Some(20.0);
        ac.attitude[0].heading = Some(123.0);
        let own = ac.ownship();
        assert_eq!(own.position(), Some((10.0, 20.0)));
        assert_eq!(own.mag_heading, Some(123.0));
    }

    #[test]
    fn test_tas_and_density_altitude_derived() {
        let mut ac = Aircraft::new(30.0);
        let slots = ac.register(&[SampleKind::Air]);
        ac.apply(
            &slots,
            TelemetryUpdate::Air(AirSample {
                ias: Some(120.0),
                pressure_alt: Some(8000.0),
                oat: Some(59.0),
                ..Default::default()
            }),
        );
        let air = &ac.air[0];
        let tas = air.tas.unwrap();
        assert!((tas - navmath::ias_to_tas(120.0, 8000.0, 59.0)).abs() < 1e-9);
        assert!(tas > 130.0 && tas < 145.0, "tas {tas}");
        // warmer than ISA at 8000 ft, so density altitude is higher
        assert!(air.density_alt.unwrap() > 8000.0);
    }

    #[test]
    fn test_ias_derived_from_tas_at_isa() {
        let mut ac = Aircraft::new(30.0);
        let slots = ac.register(&[SampleKind::Air]);
        ac.apply(
            &slots,
            TelemetryUpdate::Air(AirSample {
                tas: Some(100.0),
                pressure_alt: Some(0.0),
                ..Default::default()
            }),
        );
        let air = &ac.air[0];
        assert!((air.ias.unwrap() - 100.0).abs() < 1e-6);
        assert!(air.density_alt.unwrap().abs() < 1.0);
    }

    #[test]
    fn test_source_values_not_overwritten() {
        let mut ac = Aircraft::new(30.0);
        let slots = ac.register(&[SampleKind::Air]);
        ac.apply(
            &slots,
            TelemetryUpdate::Air(AirSample {
                ias: Some(100.0),
                tas: Some(111.0),
                pressure_alt: Some(5000.0),
                density_alt: Some(6100.0),
                wind_dir: Some(270.0),
                wind_speed: Some(12.0),
                ..Default::default()
            }),
        );
        let air = &ac.air[0];
        assert_eq!(air.tas, Some(111.0));
        assert_eq!(air.density_alt, Some(6100.0));
        assert_eq!(air.wind_dir, Some(270.0));
    }

    #[test]
    fn test_wind_from_air_and_ground_vectors() {
        let mut ac = Aircraft::new(30.0);
        let slots = ac.register(&[SampleKind::Attitude, SampleKind::Air, SampleKind::Gps]);
        ac.apply(
            &slots,
            TelemetryUpdate::Gps(GpsSample {
                lat: Some(37.0),
                lon: Some(-122.0),
                ground_track: Some(90.0),
                ground_speed: Some(100.0),
                ..Default::default()
            }),
        );
        ac.apply(
            &slots,
            TelemetryUpdate::Attitude(AttitudeSample {
                heading: Some(90.0),
                ..Default::default()
            }),
        );
        ac.apply(
            &slots,
            TelemetryUpdate::Air(AirSample {
                tas: Some(120.0),
                ..Default::default()
            }),
        );
        // 20 mph headwind
        let air = &ac.air[0];
        assert!((air.wind_dir.unwrap() - 90.0).abs() < 1e-6);
        assert!((air.wind_speed.unwrap() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_delta_carries_only_touched_slots() {
        let mut ac = Aircraft::new(30.0);
        ac.register(&[SampleKind::Gps]);
        let slots = ac.register(&[SampleKind::Attitude, SampleKind::Gps, SampleKind::Traffic]);
        ac.apply(
            &slots,
            TelemetryUpdate::Attitude(AttitudeSample {
                pitch: Some(4.0),
                ..Default::default()
            }),
        );
        let d = ac.delta(&slots, &[SampleKind::Attitude, SampleKind::Traffic]);
        assert_eq!(d.attitude.as_ref().map(|(i, a)| (*i, a.pitch)), Some((0, Some(4.0))));
        assert!(d.gps.is_none());
        assert_eq!(d.target_count, Some(0));

        let v = d.to_json_filtered(None);
        assert_eq!(v["attitude"]["slot"], json!(0));
        assert_eq!(v["attitude"]["pitch"], json!(4.0));
        assert!(v.get("gps").is_none());

        let none = ac.delta(&slots, &[]);
        assert!(none.is_empty());
        // second decoder's gps slot
        assert_eq!(ac.delta(&slots, &[SampleKind::Gps]).gps.map(|(i, _)| i), Some(1));
    }

    #[test]
    fn test_json_groups() {
        let mut ac = Aircraft::new(30.0);
        let slots = ac.register(&[SampleKind::Air]);
        ac.apply(
            &slots,
            TelemetryUpdate::Air(AirSample {
                ias: Some(100.0),
                tas: Some(110.0),
                ..Default::default()
            }),
        );
        let mask = FieldMask::parse("ias");
        let v = ac.to_json_filtered(Some(&mask));
        assert_eq!(v["air"][0]["ias"], json!(100.0));
        assert!(v["air"][0].get("tas").is_none());
        assert_eq!(v["target_count"], json!(0));
    }
}
