//! End-to-end hot/cold sweeps on the simulated DAQ bench
//!
//! The simulated IF chain uses the same load temperatures as the sweep defaults, so the
//! noise temperature derived from each row must reproduce the model's receiver
//! temperature at that bias.

use std::sync::Arc;
use std::time::Duration;
use yfactor_sweep::data::{CsvSink, MemorySink, RunMetadata};
use yfactor_sweep::error_recovery::RetryPolicy;
use yfactor_sweep::hardware::mock::{
    BoardOperation, FixedThermometer, InjectedFault, SimulatedDaqBoard, SimulatedPowerMeter,
};
use yfactor_sweep::hardware::{
    BiasCalibration, DaqBias, DaqChannels, DigitalLoadMover, LoadState,
};
use yfactor_sweep::{
    generate_sweep_points, HardwareErrorKind, Instruments, SampleRow, SweepConfig,
    SweepController, SweepError,
};

fn board(faults: Vec<InjectedFault>) -> Arc<SimulatedDaqBoard> {
    Arc::new(
        SimulatedDaqBoard::new(DaqChannels::default(), BiasCalibration::default())
            .with_load_bit(3, false)
            .with_faults(faults),
    )
}

fn bench(board: &Arc<SimulatedDaqBoard>) -> Instruments {
    let meter = Arc::new(SimulatedPowerMeter::new(board.clone()));
    let bias = Arc::new(
        DaqBias::new(
            board.clone(),
            DaqChannels::default(),
            BiasCalibration::default(),
        )
        .with_power_meter(meter),
    );
    let load = Arc::new(DigitalLoadMover::new(board.clone(), 3, false));
    Instruments::new(bias.clone(), bias).with_load_actuator(load)
}

fn controller() -> SweepController {
    SweepController::new().with_retry_policy(RetryPolicy {
        max_retries: 2,
        backoff_delay: Duration::from_millis(1),
    })
}

fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} +/- {tolerance}, got {actual}"
    );
}

#[tokio::test]
async fn test_sweep_recovers_receiver_temperature() {
    let board = board(vec![]);
    let config = SweepConfig::builder(1.0, 3.0, 0.1)
        .load_cycle(5)
        .build()
        .unwrap();
    let points = generate_sweep_points(&config);
    assert_eq!(points.len(), 21);

    let mut sink = MemorySink::new();
    let result = controller()
        .run_sweep(&points, &config, &bench(&board), &mut sink)
        .await
        .unwrap();

    assert_eq!(result.len(), points.len());
    for (row, point) in result.iter().zip(&points) {
        assert_eq!(row.bias, *point);
        assert_close(row.voltage, *point, 1e-9);
        assert_close(row.current, board.junction().current_ma(*point), 1e-9);
        assert!(row.hot_power > row.cold_power);
        assert_close(row.tsys, board.if_model().receiver_temperature_k(*point), 1e-6);
    }

    // The IF model is quadratic around its optimum bias
    let best = result.best_tsys().unwrap();
    assert_close(best.bias, board.if_model().optimum_bias_mv, 0.05 + 1e-9);

    // Load ends in after the last hot pass; 5 groups, 2 moves each
    assert_eq!(board.load_state().await, LoadState::In);
    assert_eq!(board.call_count(BoardOperation::WriteBit).await, 10);
    assert_eq!(board.call_count(BoardOperation::Scan).await, 42);
}

#[tokio::test]
async fn test_reverse_sweep_rows_follow_point_order() {
    let board = board(vec![]);
    let config = SweepConfig::builder(0.0, 2.0, 0.5)
        .reverse(true)
        .load_cycle(2)
        .build()
        .unwrap();
    let points = generate_sweep_points(&config);

    let result = controller()
        .run_sweep(&points, &config, &bench(&board), &mut MemorySink::new())
        .await
        .unwrap();

    let biases: Vec<f64> = result.iter().map(|r| r.bias).collect();
    assert_eq!(biases, vec![2.0, 1.5, 1.0, 0.5, 0.0]);
}

#[tokio::test]
async fn test_transient_scan_failures_are_retried() {
    // Second scan fails twice in a row, then the bus recovers
    let board = board(vec![InjectedFault::once(
        BoardOperation::Scan,
        2,
        HardwareErrorKind::Communication,
    )
    .repeated(2)]);
    let config = SweepConfig::builder(1.0, 2.0, 0.5).build().unwrap();
    let points = generate_sweep_points(&config);

    let result = controller()
        .run_sweep(&points, &config, &bench(&board), &mut MemorySink::new())
        .await
        .unwrap();

    assert_eq!(result.len(), 3);
    assert!(result.iter().all(SampleRow::has_tsys));
    assert_eq!(board.call_count(BoardOperation::Scan).await, 8);
}

#[tokio::test]
async fn test_protocol_failure_aborts_with_completed_rows() {
    // load_cycle 1: scans 1-2 measure point 0, scan 3 is the cold pass of point 1
    let board = board(vec![InjectedFault::once(
        BoardOperation::Scan,
        3,
        HardwareErrorKind::Protocol,
    )]);
    let config = SweepConfig::builder(1.0, 2.0, 0.5).build().unwrap();
    let points = generate_sweep_points(&config);

    let err = controller()
        .run_sweep(&points, &config, &bench(&board), &mut MemorySink::new())
        .await
        .unwrap_err();

    match err {
        SweepError::Aborted {
            index,
            partial,
            source,
        } => {
            assert_eq!(index, 1);
            assert_eq!(partial.len(), 1);
            assert_eq!(partial.rows()[0].bias, 1.0);
            assert_eq!(source.kind, HardwareErrorKind::Protocol);
            assert_eq!(source.device, "simulated_daq");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(board.call_count(BoardOperation::Scan).await, 3);
}

#[tokio::test]
async fn test_load_mover_failure_aborts_group() {
    // The very first load move times out on every attempt
    let board = board(vec![InjectedFault::once(
        BoardOperation::WriteBit,
        1,
        HardwareErrorKind::Timeout,
    )
    .repeated(3)]);
    let config = SweepConfig::builder(1.0, 2.0, 0.5)
        .load_cycle(3)
        .build()
        .unwrap();
    let points = generate_sweep_points(&config);

    let err = controller()
        .run_sweep(&points, &config, &bench(&board), &mut MemorySink::new())
        .await
        .unwrap_err();

    assert_eq!(err.failed_index(), Some(0));
    assert!(err.partial().is_some_and(|p| p.is_empty()));
    assert_eq!(board.call_count(BoardOperation::Scan).await, 0);
}

#[tokio::test]
async fn test_sensor_temperatures_are_recorded() {
    let board = board(vec![]);
    let instruments = bench(&board)
        .with_hot_sensor(Arc::new(FixedThermometer::new(295.0)))
        .with_cold_sensor(Arc::new(FixedThermometer::new(77.0)));
    // Nominal temperatures deliberately wrong; the sensors win
    let config = SweepConfig::builder(2.0, 2.4, 0.2)
        .load_temperatures(300.0, 80.0)
        .build()
        .unwrap();
    let points = generate_sweep_points(&config);

    let result = controller()
        .run_sweep(&points, &config, &instruments, &mut MemorySink::new())
        .await
        .unwrap();

    for row in &result {
        assert_eq!(row.t_hot, 295.0);
        assert_eq!(row.t_cold, 77.0);
        assert_close(row.tsys, board.if_model().receiver_temperature_k(row.bias), 1e-6);
    }
}

#[tokio::test]
async fn test_without_power_meter_or_load_mover() {
    let board = board(vec![]);
    let bias = Arc::new(DaqBias::new(
        board.clone(),
        DaqChannels::default(),
        BiasCalibration::default(),
    ));
    let instruments = Instruments::new(bias.clone(), bias);
    let config = SweepConfig::builder(0.0, 4.0, 1.0).build().unwrap();
    let points = generate_sweep_points(&config);

    let result = controller()
        .run_sweep(&points, &config, &instruments, &mut MemorySink::new())
        .await
        .unwrap();

    assert_eq!(result.len(), 5);
    assert!(result.best_tsys().is_none());
    for row in &result {
        assert_eq!(row.cold_power, 0.0);
        assert_eq!(row.y_factor, -1.0);
        assert_eq!(row.tsys, 1.0e99);
        assert_close(row.current, board.junction().current_ma(row.bias), 1e-9);
    }
    assert_eq!(board.call_count(BoardOperation::WriteBit).await, 0);
}

#[tokio::test]
async fn test_csv_output_matches_result() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sweep.csv");

    let board = board(vec![]);
    let config = SweepConfig::builder(1.5, 2.5, 0.25)
        .load_cycle(2)
        .park_bias(Some(0.0))
        .build()
        .unwrap();
    let points = generate_sweep_points(&config);

    let mut sink = CsvSink::create(&path, &RunMetadata::from_config(&config)).unwrap();
    let result = controller()
        .run_sweep(&points, &config, &bench(&board), &mut sink)
        .await
        .unwrap();
    assert_eq!(sink.rows_written(), 5);

    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .from_path(&path)
        .unwrap();
    let rows: Vec<SampleRow> = reader.deserialize().map(|r| r.unwrap()).collect();
    assert_eq!(rows, result.into_rows());

    // Bias parked after the run
    assert_close(board.junction_bias_mv().await, 0.0, 1e-9);
}
