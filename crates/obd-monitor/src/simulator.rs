//! Scripted drive for the simulated ECU

use obd_protocol::mock::MockEcu;

/// Idle, accelerate, cruise, brake, repeat
#[derive(Debug, Default)]
pub struct Drive {
    tick: u32,
}

/// Ticks per drive cycle
const CYCLE: u32 = 400;

impl Drive {
    /// Advance one tick and write the new engine state into `ecu`
    pub fn advance(&mut self, ecu: &mut MockEcu) {
        self.tick = (self.tick + 1) % CYCLE;
        let (rpm, speed) = match self.tick {
            0..=49 => (800, 0),
            t @ 50..=149 => (800 + (t - 50) * 27, (t - 50) * 12 / 10),
            150..=299 => (2200, 120),
            t => (2200 - (t - 300) * 14, 120 - (t - 300) * 12 / 10),
        };
        ecu.rpm_raw = (rpm * 4) as u16;
        ecu.speed = speed as u8;

        // Warm up to 90 °C and stay there
        if ecu.coolant_raw < 130 && self.tick % 10 == 0 {
            ecu.coolant_raw += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_stays_in_range() {
        let mut drive = Drive::default();
        let mut ecu = MockEcu {
            coolant_raw: 60,
            ..Default::default()
        };
        for _ in 0..CYCLE * 3 {
            drive.advance(&mut ecu);
            assert!(ecu.rpm_raw >= 800 * 4 && ecu.rpm_raw <= 3500 * 4);
            assert!(ecu.speed <= 120);
            assert!(ecu.coolant_raw <= 130);
        }
        assert_eq!(ecu.coolant_raw, 130);
    }
}
