use std::time::Duration;

use log::{debug, error};
use rppal::gpio::OutputPin;

/// Hobby servos expect a 50 Hz frame.
const SERVO_PERIOD: Duration = Duration::from_millis(20);

/// Output side of the lock: the servo that moves the bolt and the indicator LED.
///
/// Calls are fire-and-forget; implementations log their own failures.
pub trait ActuatorPort: Send {
    fn drive(&mut self, pulse_width: Duration);

    fn set_indicator(&mut self, lit: bool);

    /// Stop driving the servo.
    fn power_off(&mut self);
}

impl<T: ActuatorPort + ?Sized> ActuatorPort for Box<T> {
    fn drive(&mut self, pulse_width: Duration) {
        (**self).drive(pulse_width)
    }

    fn set_indicator(&mut self, lit: bool) {
        (**self).set_indicator(lit)
    }

    fn power_off(&mut self) {
        (**self).power_off()
    }
}

pub struct ServoActuator {
    motor: OutputPin,
    led: OutputPin,
}

impl ServoActuator {
    pub fn new(motor: OutputPin, led: OutputPin) -> Self {
        ServoActuator { motor, led }
    }
}

impl ActuatorPort for ServoActuator {
    fn drive(&mut self, pulse_width: Duration) {
        if let Err(err) = self.motor.set_pwm(SERVO_PERIOD, pulse_width) {
            error!("unable to drive servo at {:?}: {}", pulse_width, err);
        }
    }

    fn set_indicator(&mut self, lit: bool) {
        if lit {
            self.led.set_high();
        } else {
            self.led.set_low();
        }
    }

    fn power_off(&mut self) {
        if let Err(err) = self.motor.clear_pwm() {
            error!("unable to power off servo: {}", err);
        }
    }
}

/// Stand-in used when the GPIO pins could not be acquired.
pub struct LogActuator;

impl ActuatorPort for LogActuator {
    fn drive(&mut self, pulse_width: Duration) {
        debug!("servo drive {}us (no GPIO)", pulse_width.as_micros());
    }

    fn set_indicator(&mut self, lit: bool) {
        debug!("indicator {} (no GPIO)", if lit { "on" } else { "off" });
    }

    fn power_off(&mut self) {
        debug!("servo off (no GPIO)");
    }
}
