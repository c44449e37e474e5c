/// Device-driven capture quality tier (§9's "Adaptive quality"). Clamps
/// capture scale, throttles the timer, and may refuse low-importance
/// capture requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceLevel {
    Normal,
    Reduced,
    Minimal,
    Paused,
}

impl PerformanceLevel {
    /// Multiplier applied on top of the configured base capture scale.
    pub fn scale_multiplier(self) -> f32 {
        match self {
            PerformanceLevel::Normal => 1.0,
            PerformanceLevel::Reduced => 0.75,
            PerformanceLevel::Minimal => 0.5,
            PerformanceLevel::Paused => 0.0,
        }
    }

    pub fn should_capture(self) -> bool {
        !matches!(self, PerformanceLevel::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermalStatus {
    Nominal,
    Fair,
    Serious,
    Severe,
    Critical,
}

/// The device signals that drive `compute_level`.
#[derive(Debug, Clone, Copy)]
pub struct DeviceSignals {
    pub thermal: ThermalStatus,
    pub battery_level: f32,
    pub memory_warning: bool,
}

/// Thermal status dominates; battery and memory warnings can only push the
/// level down further, never back up.
pub fn compute_level(signals: DeviceSignals) -> PerformanceLevel {
    let mut level = match signals.thermal {
        ThermalStatus::Nominal | ThermalStatus::Fair => PerformanceLevel::Normal,
        ThermalStatus::Serious => PerformanceLevel::Reduced,
        ThermalStatus::Severe => PerformanceLevel::Minimal,
        ThermalStatus::Critical => PerformanceLevel::Paused,
    };

    if signals.memory_warning && level == PerformanceLevel::Normal {
        level = PerformanceLevel::Minimal;
    }

    if signals.battery_level < 0.15 && matches!(level, PerformanceLevel::Normal | PerformanceLevel::Reduced) {
        level = PerformanceLevel::Minimal;
    } else if signals.battery_level < 0.30 && level == PerformanceLevel::Normal {
        level = PerformanceLevel::Reduced;
    }

    level
}
