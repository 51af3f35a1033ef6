use crate::{
    config::EngineConfig,
    engine::{AudioRuntime, InitFlags, SoundSystem, SpeakerMode},
    error::check,
    Result,
};

/// Creates and initializes the engine instance.
///
/// The steps run strictly in order and the first failure aborts the rest:
/// create the instance, size the mixer buffers, match the mixer sample rate to
/// the output driver, then initialize with the configured channel count.
pub fn bootstrap<R: AudioRuntime>(runtime: &mut R, config: &EngineConfig) -> Result<R::System> {
    tracing::info!("creating engine instance");
    let mut system = check("System_Create", runtime.create_system())?;

    if let Err(err) = configure(&mut system, config) {
        release_after_failure(&mut system);
        return Err(err);
    }
    Ok(system)
}

fn configure<S: SoundSystem>(system: &mut S, config: &EngineConfig) -> Result<()> {
    tracing::info!(
        length = config.dsp_buffer_length,
        count = config.dsp_buffer_count,
        "setting dsp buffer size"
    );
    check(
        "System::setDSPBufferSize",
        system.set_dsp_buffer_size(config.dsp_buffer_length, config.dsp_buffer_count),
    )?;

    let driver = check("System::getDriverInfo", system.driver_info(config.driver))?;
    tracing::info!(
        driver = %driver.name,
        sample_rate = driver.sample_rate,
        "matching mixer sample rate to output"
    );
    check(
        "System::setSoftwareFormat",
        system.set_software_format(driver.sample_rate, SpeakerMode::Default, 0),
    )?;

    tracing::info!(max_channels = config.max_channels, "initializing engine");
    check(
        "System::init",
        system.init(config.max_channels, InitFlags::NORMAL),
    )
}

/// Releases an engine instance that is being abandoned after an error.
pub(crate) fn release_after_failure<S: SoundSystem>(system: &mut S) {
    if let Err(code) = system.release() {
        tracing::warn!(%code, "engine release failed after startup error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        simulated::{EngineCall, Operation, SimulatedRuntime},
        EngineCode,
    };

    #[test]
    fn runs_every_step_in_order() {
        let mut runtime = SimulatedRuntime::with_output_rate(44_100);
        let probe = runtime.probe();

        let system = bootstrap(&mut runtime, &EngineConfig::default()).unwrap();

        assert_eq!(
            probe.calls(),
            vec![
                EngineCall::CreateSystem,
                EngineCall::SetDspBufferSize {
                    length: 2048,
                    count: 2
                },
                EngineCall::DriverInfo { driver: 0 },
                EngineCall::SetSoftwareFormat {
                    sample_rate: 44_100
                },
                EngineCall::Init { max_channels: 1024 },
            ]
        );
        assert!(system.is_initialized());
        assert_eq!(system.software_rate(), 44_100);
        assert_eq!(system.dsp_buffer(), (2048, 2));
    }

    #[test]
    fn format_failure_stops_before_init() {
        let mut runtime = SimulatedRuntime::new();
        let probe = runtime.probe();
        probe.fail_on(Operation::SetSoftwareFormat, EngineCode::Format);

        let err = bootstrap(&mut runtime, &EngineConfig::default()).unwrap_err();

        assert_eq!(err.engine_code(), Some(EngineCode::Format.code()));
        assert!(err.to_string().contains(EngineCode::Format.describe()));
        assert_eq!(probe.count(Operation::Init), 0);
        let calls = probe.calls();
        assert_eq!(
            calls[calls.len() - 2..],
            [
                EngineCall::SetSoftwareFormat {
                    sample_rate: 48_000
                },
                EngineCall::Release,
            ]
        );
    }

    #[test]
    fn half_configured_engine_is_released() {
        for operation in [
            Operation::SetDspBufferSize,
            Operation::DriverInfo,
            Operation::Init,
        ] {
            let mut runtime = SimulatedRuntime::new();
            let probe = runtime.probe();
            probe.fail_on(operation, EngineCode::Internal);

            assert!(bootstrap(&mut runtime, &EngineConfig::default()).is_err());
            assert_eq!(probe.count(Operation::Release), 1, "{operation:?}");
        }
    }

    #[test]
    fn failed_release_keeps_the_startup_error() {
        let mut runtime = SimulatedRuntime::new();
        let probe = runtime.probe();
        probe.fail_on(Operation::Init, EngineCode::Output);
        probe.fail_on(Operation::Release, EngineCode::Internal);

        let err = bootstrap(&mut runtime, &EngineConfig::default()).unwrap_err();

        assert_eq!(err.engine_code(), Some(EngineCode::Output.code()));
    }

    #[test]
    fn creation_failure_is_fatal() {
        let mut runtime = SimulatedRuntime::new();
        let probe = runtime.probe();
        probe.fail_on(Operation::CreateSystem, EngineCode::Memory);

        let err = bootstrap(&mut runtime, &EngineConfig::default()).unwrap_err();

        assert!(err.to_string().contains("System_Create"));
        assert_eq!(probe.calls(), vec![EngineCall::CreateSystem]);
    }

    #[test]
    fn unknown_driver_is_rejected() {
        let mut runtime = SimulatedRuntime::new();
        let config = EngineConfig {
            driver: 3,
            ..EngineConfig::default()
        };

        let err = bootstrap(&mut runtime, &config).unwrap_err();
        assert_eq!(err.engine_code(), Some(EngineCode::InvalidParam.code()));
    }
}
