//! GNSS sampling: fix-type retry loop wrapped around a data retry loop.

use tokio::time::sleep;
use tracing::{debug, trace};

use super::SensorDriver;
use crate::bus::SharedBus;
use crate::error::ReadError;
use crate::net::RetryPolicy;
use crate::pipeline::Reading;

/// Read one position sample.
///
/// Up to `fix.attempts` times, ask the receiver for its fix type; only a
/// valid fix authorizes up to `data.attempts` navigation reads. Exhausting
/// both loops yields [`ReadError::NoFix`], which the caller forwards as an
/// unavailable reading. A sentinel expiry aborts at once.
pub(crate) async fn sample_position(
    driver: &mut dyn SensorDriver,
    bus: &SharedBus,
    fix: RetryPolicy,
    data: RetryPolicy,
    reading: &mut Reading,
) -> Result<(), ReadError> {
    let kind = driver.kind();

    for fix_attempt in 1..=fix.attempts {
        match bus.transact(kind, driver.fix_type()).await? {
            Ok(fix_type) if fix_type.is_valid() => {
                trace!("Valid fix {:?} on attempt {}", fix_type, fix_attempt);
                for data_attempt in 1..=data.attempts {
                    match bus.transact(kind, driver.read(reading)).await? {
                        Ok(()) => return Ok(()),
                        Err(e) => {
                            debug!("Navigation read {}/{} failed: {}", data_attempt, data.attempts, e);
                            if data_attempt < data.attempts {
                                sleep(data.delay).await;
                            }
                        }
                    }
                }
            }
            Ok(fix_type) => trace!("No usable fix yet ({:?})", fix_type),
            Err(e) => debug!("Fix type query failed: {}", e),
        }
        if fix_attempt < fix.attempts {
            sleep(fix.delay).await;
        }
    }

    Err(ReadError::NoFix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::mocks::{MockSensor, Step};
    use crate::sensor::{FixProtocol, FixType};
    use crate::status::{SensorKind, StatusRegistry};
    use std::sync::Arc;
    use std::time::Duration;

    fn policies() -> (RetryPolicy, RetryPolicy) {
        (
            RetryPolicy::new(10, Duration::from_millis(500)),
            RetryPolicy::new(5, Duration::from_millis(200)),
        )
    }

    fn bus() -> SharedBus {
        SharedBus::new(Duration::from_millis(2000), Arc::new(StatusRegistry::new()))
    }

    const NO_FIX: FixType = FixType { protocol: FixProtocol::Ubx, code: 0 };

    #[tokio::test(start_paused = true)]
    async fn test_valid_fix_reads_data() {
        let mut mock = MockSensor::new(SensorKind::Positional);
        let (fix, data) = policies();
        let mut reading = Reading::empty(SensorKind::Positional);

        let result = sample_position(&mut mock, &bus(), fix, data, &mut reading).await;

        assert!(result.is_ok());
        assert_eq!(mock.count("fix_type"), 1);
        assert_eq!(mock.count("read"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_fix() {
        let mut mock = MockSensor::new(SensorKind::Positional);
        mock.script_fix(Step::Return(Ok(NO_FIX)));
        mock.script_fix(Step::Return(Err(ReadError::NoData)));
        let (fix, data) = policies();
        let mut reading = Reading::empty(SensorKind::Positional);

        let started = tokio::time::Instant::now();
        let result = sample_position(&mut mock, &bus(), fix, data, &mut reading).await;

        assert!(result.is_ok());
        assert_eq!(mock.count("fix_type"), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_loops_exhausted() {
        let mut mock = MockSensor::new(SensorKind::Positional);
        mock.set_read_default(Step::Return(Err(ReadError::NoData)));
        let (fix, data) = policies();
        let mut reading = Reading::empty(SensorKind::Positional);

        let result = sample_position(&mut mock, &bus(), fix, data, &mut reading).await;

        assert_eq!(result, Err(ReadError::NoFix));
        assert_eq!(mock.count("fix_type"), 10);
        assert_eq!(mock.count("read"), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_pause_after_last_attempt() {
        let mut mock = MockSensor::new(SensorKind::Positional);
        mock.set_read_default(Step::Return(Err(ReadError::NoData)));
        let fix = RetryPolicy::new(2, Duration::from_millis(500));
        let data = RetryPolicy::new(3, Duration::from_millis(200));
        let mut reading = Reading::empty(SensorKind::Positional);

        let started = tokio::time::Instant::now();
        let result = sample_position(&mut mock, &bus(), fix, data, &mut reading).await;

        assert_eq!(result, Err(ReadError::NoFix));
        // Two data pauses per fix, one pause between the fixes
        assert_eq!(started.elapsed(), Duration::from_millis(2 * 400 + 500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fix_never_reads() {
        let mut mock = MockSensor::new(SensorKind::Positional);
        mock.set_fix_default(Step::Return(Ok(FixType { protocol: FixProtocol::Nmea, code: 0 })));
        let (fix, data) = policies();
        let mut reading = Reading::empty(SensorKind::Positional);

        let result = sample_position(&mut mock, &bus(), fix, data, &mut reading).await;

        assert_eq!(result, Err(ReadError::NoFix));
        assert_eq!(mock.count("read"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sentinel_expiry_aborts() {
        let mut mock = MockSensor::new(SensorKind::Positional);
        mock.set_fix_default(Step::Hang);
        let (fix, data) = policies();
        let mut reading = Reading::empty(SensorKind::Positional);

        let result = sample_position(&mut mock, &bus(), fix, data, &mut reading).await;

        assert!(result.unwrap_err().is_timeout());
        assert_eq!(mock.count("fix_type"), 1);
    }
}
