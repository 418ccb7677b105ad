use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLevel {
    Startup = 10,
    HardReset = 20,
    Standby = 30,
    Reset = 40,
    Running = 50,
    Stressed = 60,
    Error = 70,
    Shutdown = 80,
}

impl Default for RunLevel {
    fn default() -> Self {
        RunLevel::Startup
    }
}

pub const RUNLEVEL_TIMEOUT: Duration = Duration::from_millis(450);
pub const GET_CONFIG_TIMEOUT: Duration = Duration::from_secs(2);

/// Pacing gaps in the NPlay startup choreography, carried verbatim from the
/// reference implementation's literal sleep durations.
pub const NPLAY_STEP_1_DELAY: Duration = Duration::from_millis(200);
pub const NPLAY_STEP_2_DELAY: Duration = Duration::from_millis(100);
pub const NPLAY_STEP_3_DELAY: Duration = Duration::from_millis(100);
