//! Operating mode tags and display-mode derivation
//!
//! Modes are normalized to the labels logging clients expect. The DV tag gets
//! a derived presentation form at publish time: Icom's D-STAR DR mode lives in
//! fixed repeater sub-bands, so the current frequency distinguishes
//! `D-STAR (DR)` from `D-STAR (DV)`.

use std::fmt;

use serde::{Serialize, Serializer};

/// Operating modes reported by connected transceivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RigMode {
    /// Lower Sideband
    Lsb,
    /// Upper Sideband
    Usb,
    /// Continuous Wave
    Cw,
    /// CW Reverse
    CwR,
    /// CW Upper (Yaesu/Kenwood CW on USB side)
    CwU,
    /// Amplitude Modulation
    Am,
    /// AM Narrow
    AmN,
    /// Frequency Modulation
    Fm,
    /// FM Narrow
    FmN,
    /// Wide FM
    Wfm,
    /// RTTY
    Rtty,
    /// RTTY Reverse
    RttyR,
    /// RTTY Lower
    RttyLsb,
    /// RTTY Upper
    RttyUsb,
    /// Yaesu System Fusion digital voice
    C4fm,
    /// Icom D-STAR digital voice
    Dv,
}

impl RigMode {
    /// Wire label used in published events and snapshots
    pub fn as_str(&self) -> &'static str {
        match self {
            RigMode::Lsb => "LSB",
            RigMode::Usb => "USB",
            RigMode::Cw => "CW",
            RigMode::CwR => "CW-R",
            RigMode::CwU => "CW-U",
            RigMode::Am => "AM",
            RigMode::AmN => "AM-N",
            RigMode::Fm => "FM",
            RigMode::FmN => "FM-N",
            RigMode::Wfm => "WFM",
            RigMode::Rtty => "RTTY",
            RigMode::RttyR => "RTTY-R",
            RigMode::RttyLsb => "RTTY-LSB",
            RigMode::RttyUsb => "RTTY-USB",
            RigMode::C4fm => "C4FM",
            RigMode::Dv => "DV",
        }
    }
}

impl fmt::Display for RigMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RigMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Check whether a frequency falls in a D-STAR DR (repeater) sub-band.
///
/// 430 MHz band: 434.000–435.000 and 439.000–440.000 (upper bound exclusive).
/// 1200 MHz band: 1270.000–1273.000, 1290.000–1293.000 (exclusive) and
/// 1299.000–1300.000 (inclusive).
pub fn is_dstar_dr(freq: i64) -> bool {
    (434_000_000..435_000_000).contains(&freq)
        || (439_000_000..440_000_000).contains(&freq)
        || (1_270_000_000..1_273_000_000).contains(&freq)
        || (1_290_000_000..1_293_000_000).contains(&freq)
        || (1_299_000_000..=1_300_000_000).contains(&freq)
}

/// Presentation label for a mode, substituting the D-STAR form for DV when
/// the frequency is known.
pub fn display_mode(mode: RigMode, freq: i64) -> &'static str {
    if mode == RigMode::Dv && freq > 0 {
        if is_dstar_dr(freq) {
            "D-STAR (DR)"
        } else {
            "D-STAR (DV)"
        }
    } else {
        mode.as_str()
    }
}
