//! Traffic target fusion and lifecycle
//!
//! A [`TargetSet`] holds every contact reported by traffic receivers and
//! mesh radios, plus synthetic buoy markers. Each update recomputes the
//! contact's bearing, distance and altitude difference relative to the
//! current own-ship fix, drops contacts outside the ignore radius and
//! deduplicates by address (falling back to callsign).

use crate::model::{PayloadMessage, Target, CATEGORY_BUOY};
use crate::navmath;
use crate::units::{METERS_TO_MILES, MILES_TO_METERS};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// Seconds after which an unrefreshed target is dropped
pub const MAX_TARGET_AGE_SECS: i64 = 100;

/// Inbound payload messages retained across all senders
pub const MAX_PAYLOAD_MESSAGES: usize = 10;

pub const DEFAULT_IGNORE_RADIUS_MI: f64 = 30.0;

/// Speed given to a buoy when the caller does not specify one, mph
pub const DEFAULT_BUOY_SPEED: f64 = 100.0;

/// Own-ship reference used for relative geometry
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OwnshipFix {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// ft
    pub alt: Option<f64>,
    pub ground_track: Option<f64>,
    /// mph
    pub ground_speed: Option<f64>,
    /// mph
    pub airspeed: Option<f64>,
    /// First available IMU magnetic heading
    pub mag_heading: Option<f64>,
}

impl OwnshipFix {
    pub fn position(&self) -> Option<(f64, f64)> {
        Some((self.lat?, self.lon?))
    }
}

/// Where a buoy is placed relative to own-ship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuoyPlacement {
    Here,
    Ahead,
}

/// Speed assigned to a new buoy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BuoySpeed {
    Default,
    /// Own-ship airspeed, else ground speed, else 0
    Ownship,
    Fixed(f64),
}

impl BuoySpeed {
    /// Numeric request form: absent means default, -1 means own-ship
    pub fn from_request(speed: Option<f64>) -> Self {
        match speed {
            None => BuoySpeed::Default,
            Some(s) if s == -1.0 => BuoySpeed::Ownship,
            Some(s) => BuoySpeed::Fixed(s),
        }
    }

    fn resolve(&self, own: &OwnshipFix) -> f64 {
        match self {
            BuoySpeed::Default => DEFAULT_BUOY_SPEED,
            BuoySpeed::Ownship => own.airspeed.or(own.ground_speed).unwrap_or(0.0),
            BuoySpeed::Fixed(s) => *s,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TargetSet {
    targets: Vec<Target>,
    messages: VecDeque<PayloadMessage>,
    ignore_radius_mi: f64,
    next_buoy: u32,
}

impl Default for TargetSet {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORE_RADIUS_MI)
    }
}

impl TargetSet {
    pub fn new(ignore_radius_mi: f64) -> Self {
        Self {
            targets: Vec::new(),
            messages: VecDeque::with_capacity(MAX_PAYLOAD_MESSAGES),
            ignore_radius_mi,
            next_buoy: 0,
        }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn count(&self) -> usize {
        self.targets.len()
    }

    pub fn ignore_radius(&self) -> f64 {
        self.ignore_radius_mi
    }

    /// Most recent payload messages, oldest first
    pub fn messages(&self) -> impl Iterator<Item = &PayloadMessage> {
        self.messages.iter()
    }

    fn position_of(&self, target: &Target) -> Option<usize> {
        if let Some(address) = target.address {
            if let Some(i) = self.targets.iter().position(|t| t.address == Some(address)) {
                return Some(i);
            }
        }
        let callsign = target.callsign.as_deref()?;
        self.targets
            .iter()
            .position(|t| t.callsign.as_deref() == Some(callsign))
    }

    /// Insert a new contact or replace the existing one in place.
    ///
    /// Returns `false` when the contact was evicted by the distance rule
    /// (any previous entry for it is removed as well).
    pub fn add_or_update(&mut self, mut target: Target, own: &OwnshipFix) -> bool {
        if !target.has_position() {
            if let Some(known) = self
                .targets
                .iter()
                .find(|t| t.address.is_some() && t.address == target.address && t.has_position())
            {
                target.lat = known.lat;
                target.lon = known.lon;
            }
        }

        let existing = self.position_of(&target);
        if let Some(i) = existing {
            let prior = &self.targets[i];
            if target.last_payload.is_none() {
                target.last_payload = prior.last_payload.clone();
            }
            if target.distance.is_none() {
                target.distance = prior.distance;
                target.bearing = prior.bearing;
            }
        }

        if let (Some(from), Some(lat), Some(lon)) = (own.position(), target.lat, target.lon) {
            match navmath::inverse(from, (lat, lon)) {
                Some((azimuth, meters)) => {
                    target.bearing = Some(navmath::azimuth_to_bearing(azimuth));
                    target.distance = Some(meters * METERS_TO_MILES);
                }
                None => trace!(address = ?target.address, "geodesic undefined, keeping prior distance"),
            }
        }

        if !target.is_mesh() && !target.is_buoy() {
            let beyond = match target.distance {
                Some(d) => d > self.ignore_radius_mi,
                None => true,
            };
            if beyond {
                if let Some(i) = existing {
                    self.targets.remove(i);
                }
                trace!(address = ?target.address, distance = ?target.distance, "target outside ignore radius");
                return false;
            }
        }

        if let (Some(alt), Some(own_alt)) = (target.alt, own.alt) {
            target.alt_diff = Some(alt - own_alt);
        }

        match existing {
            Some(i) => self.targets[i] = target,
            None => {
                debug!(address = ?target.address, callsign = ?target.callsign, "new target");
                self.targets.push(target);
            }
        }
        true
    }

    /// Age out stale targets. Stale buoys are refreshed instead of removed.
    pub fn clean_up(&mut self, now: i64, own: &OwnshipFix) {
        let mut stale_buoys = Vec::new();
        let before = self.targets.len();
        self.targets.retain(|t| {
            if now - t.last_seen <= MAX_TARGET_AGE_SECS {
                return true;
            }
            if t.is_buoy() {
                stale_buoys.push(t.clone());
                return true;
            }
            false
        });
        let removed = before - self.targets.len();
        if removed > 0 {
            debug!(removed, "aged out targets");
        }

        for mut buoy in stale_buoys {
            buoy.last_seen = now;
            self.add_or_update(buoy, own);
        }
    }

    /// Create a synthetic marker at or ahead of own-ship.
    ///
    /// "Ahead" projects along ground track, else the IMU heading. Returns
    /// `None` without an own-ship position, or without either direction
    /// when projecting ahead.
    pub fn drop_buoy(
        &mut self,
        own: &OwnshipFix,
        placement: BuoyPlacement,
        distance_mi: f64,
        alt_offset_ft: f64,
        speed: BuoySpeed,
        now: i64,
    ) -> Option<Target> {
        let here = own.position()?;
        let (lat, lon) = match placement {
            BuoyPlacement::Here => here,
            BuoyPlacement::Ahead => {
                let track = own.ground_track.or(own.mag_heading)?;
                navmath::direct(here, track, distance_mi * MILES_TO_METERS)?
            }
        };

        self.next_buoy += 1;
        let num = self.next_buoy;
        let buoy = Target {
            address: Some(num),
            callsign: Some(num.to_string()),
            category: CATEGORY_BUOY,
            lat: Some(lat),
            lon: Some(lon),
            alt: Some(own.alt.unwrap_or(0.0) + alt_offset_ft),
            track: own.mag_heading.or(own.ground_track),
            speed: Some(speed.resolve(own)),
            last_seen: now,
            buoy_num: Some(num),
            ..Default::default()
        };

        debug!(buoy = num, lat, lon, "dropped buoy");
        self.add_or_update(buoy, own);
        self.targets.iter().find(|t| t.buoy_num == Some(num)).cloned()
    }

    /// Closest target with a known distance no further than `radius_mi`
    pub fn get_nearest_within(&self, radius_mi: f64) -> Option<&Target> {
        let mut nearest: Option<&Target> = None;
        for t in &self.targets {
            let Some(d) = t.distance else { continue };
            if d > radius_mi {
                continue;
            }
            match nearest.and_then(|n| n.distance) {
                Some(best) if d >= best => {}
                _ => nearest = Some(t),
            }
        }
        nearest
    }

    /// Record an inbound payload message and attach it to its recipient
    pub fn add_payload(&mut self, message: PayloadMessage) {
        if self.messages.len() == MAX_PAYLOAD_MESSAGES {
            self.messages.pop_front();
        }
        if let Some(recipient) = message.recipient_address {
            if let Some(t) = self.targets.iter_mut().find(|t| t.address == Some(recipient)) {
                t.last_payload = Some(message.clone());
            }
        }
        self.messages.push_back(message);
    }
}
