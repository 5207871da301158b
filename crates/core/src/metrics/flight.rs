//! Scheduling state of the metric recomputation.
//!
//! A single enum, mutated under a single lock, replaces the usual pair of
//! "scheduled" / "repeat requested" booleans:
//!
//! - **Idle**: nothing scheduled or running.
//! - **Scheduled**: a debounce timer is pending; further requests coalesce.
//! - **InFlight**: one recomputation is running.
//! - **InFlightRepeatPending**: running, and exactly one more run is owed.

/// Recomputation state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FlightState {
    #[default]
    Idle,
    Scheduled,
    InFlight,
    InFlightRepeatPending,
}

impl std::fmt::Display for FlightState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scheduled => write!(f, "Scheduled"),
            Self::InFlight => write!(f, "InFlight"),
            Self::InFlightRepeatPending => write!(f, "InFlightRepeatPending"),
        }
    }
}

impl FlightState {
    /// Registers an update request.
    ///
    /// Returns true when the caller must start the debounce timer.
    pub fn request(&mut self) -> bool {
        match *self {
            Self::Idle => {
                *self = Self::Scheduled;
                true
            }
            Self::InFlight => {
                *self = Self::InFlightRepeatPending;
                false
            }
            Self::Scheduled | Self::InFlightRepeatPending => false,
        }
    }

    /// The debounce timer fired.
    ///
    /// Returns true when the caller must start a recomputation.
    pub fn begin(&mut self) -> bool {
        if *self == Self::Scheduled {
            *self = Self::InFlight;
            true
        } else {
            false
        }
    }

    /// A recomputation completed.
    ///
    /// Returns true when exactly one more recomputation must start now.
    pub fn finish(&mut self) -> bool {
        match *self {
            Self::InFlightRepeatPending => {
                *self = Self::InFlight;
                true
            }
            _ => {
                *self = Self::Idle;
                false
            }
        }
    }

    /// Drops whatever was scheduled or running, owed repeats included.
    pub fn abandon(&mut self) {
        *self = Self::Idle;
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight | Self::InFlightRepeatPending)
    }
}
