//! Safety outputs and the touch-probe input

/// Physical I/O owned by the safety supervisor
pub trait SafetyIo {
    /// Drive the brake relay (`true` releases the brakes)
    fn set_brakes_released(&mut self, released: bool);

    /// Drive the motor driver shutdown line (`true` disables the drivers)
    fn set_shutdown(&mut self, shutdown: bool);

    /// Drive the touch-probe actuator (`true` extends the probe)
    fn set_probe_extended(&mut self, extended: bool);

    /// Read the touch-probe contact input
    fn probe_touching(&self) -> bool;
}
