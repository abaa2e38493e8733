//! End-to-end checks of the checkers against the behavioral devices.

use mac_oracle::checker::RESULT;
use mac_oracle::prelude::*;

fn result(observed: &Signals, width: u32) -> u128 {
    unpack(width, &observed[RESULT])
}

/// Pack 16-bit engine output fields into one word.
fn word(fields: &[u128]) -> u128 {
    fields
        .iter()
        .enumerate()
        .fold(0, |acc, (x, &f)| acc | (f << (x * 16)))
}

fn mac_bench(config: &MacConfig) -> Testbench<MacDevice, MacChecker> {
    Testbench::new(MacDevice::new(config), MacChecker::new(config).unwrap())
}

fn engine_bench() -> Testbench<EngineDevice, EngineChecker> {
    let config = EngineConfig::default();
    let mut tb = Testbench::new(EngineDevice::new(&config), EngineChecker::new(&config).unwrap());
    tb.send_shift(0).unwrap();
    tb.send_weight(&[1; 9]).unwrap();
    tb
}

#[test]
fn test_mac_result_after_five_cycles() {
    let mut tb = mac_bench(&MacConfig::default());
    tb.prep(|checker, sim| checker.set(sim, 5, 1, 0)).unwrap();

    let observed: Vec<u128> = (0..8).map(|_| result(&tb.tick().unwrap(), 33)).collect();
    assert_eq!(observed, vec![0, 0, 0, 0, 0, 5, 0, 0]);
    assert_eq!(tb.checker.stats().nonzero_matches, 1);
}

#[test]
fn test_mac_negative_operands() {
    let mut tb = mac_bench(&MacConfig::default());
    tb.apply_reset(2, 2).unwrap();
    for (m1, m2, add) in [(-1, 7, 0), (-300, -300, 5), (32767, 32767, -1), (0xffff, 2, 10)] {
        tb.prep(|checker, sim| checker.set(sim, m1, m2, add)).unwrap();
        tb.tick().unwrap();
    }
    tb.advance_clock(8).unwrap();
    assert_eq!(tb.checker.stats().nonzero_matches, 4);
}

#[test]
fn test_early_device_is_caught() {
    // device one stage shorter than the model
    let model = MacConfig::default();
    let short = MacConfig {
        pipeline_depth: 4,
        ..model.clone()
    };
    let mut tb = Testbench::new(MacDevice::new(&short), MacChecker::new(&model).unwrap());
    tb.prep(|checker, sim| checker.set(sim, 5, 1, 0)).unwrap();

    let err = tb.advance_clock(8).unwrap_err();
    match err {
        OracleError::Mismatch { checker, cycle, expected, observed, .. } => {
            assert_eq!(checker, "multiply_add");
            assert_eq!(cycle, 4);
            assert_eq!(expected, 0);
            assert_eq!(observed, 5);
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_fault_reported_at_faulted_cycle() {
    let config = MacConfig::default();
    let fault = OutputFault { cycle: 5, flip: 0x100 };
    let dut = FaultInjector::new(MacDevice::new(&config), Some(fault));
    let mut tb = Testbench::new(dut, MacChecker::new(&config).unwrap());
    tb.prep(|checker, sim| checker.set(sim, 5, 1, 0)).unwrap();

    let err = tb.advance_clock(10).unwrap_err();
    assert!(err.is_mismatch());
    if let OracleError::Mismatch { cycle, expected, observed, previous, .. } = err {
        assert_eq!(cycle, 5);
        assert_eq!(expected, 5);
        assert_eq!(observed, 0x105);
        assert_eq!(previous, 0);
    }
    assert_eq!(tb.cycle(), 5);
}

#[test]
fn test_reset_flushes_inflight_predictions() {
    let mut tb = mac_bench(&MacConfig::default());
    tb.prep(|checker, sim| checker.set(sim, 7, 3, 0)).unwrap();
    tb.tick().unwrap();
    tb.tick().unwrap();

    tb.apply_reset(1, 0).unwrap();
    for _ in 0..10 {
        assert_eq!(result(&tb.tick().unwrap(), 33), 0);
    }
    let stats = tb.checker.stats();
    assert_eq!(stats.nonzero_matches, 0);
    assert_eq!(stats.reset_cycles, 1);
}

#[test]
fn test_reset_wins_over_same_cycle_data() {
    let mut tb = mac_bench(&MacConfig::default());
    tb.checker.reset(&mut tb.sim, true);
    tb.prep(|checker, sim| checker.set(sim, 9, 9, 0)).unwrap();
    tb.tick().unwrap();
    tb.checker.reset(&mut tb.sim, false);
    tb.advance_clock(10).unwrap();
    assert_eq!(tb.checker.stats().nonzero_matches, 0);
}

#[test]
fn test_contract_violation_drives_nothing() {
    let mut tb = mac_bench(&MacConfig::default());
    let err = tb.prep(|checker, sim| checker.set(sim, 70_000, 1, 0)).unwrap_err();
    assert!(matches!(err, OracleError::OutOfRange { what: "m1", width: 16, .. }));
    tb.advance_clock(8).unwrap();
    assert_eq!(tb.checker.stats().nonzero_matches, 0);
}

#[test]
fn test_slice_results_eighteen_cycles_after_beats() {
    let config = SliceConfig::default();
    let mut tb = Testbench::new(SliceDevice::new(&config), SliceChecker::new(&config).unwrap());
    tb.apply_reset(2, 2).unwrap();
    tb.send_weight(&[2, 2, 2]).unwrap();

    let start = tb.cycle();
    tb.prep(|checker, sim| checker.prep_image(sim, &[1, 2, 3])).unwrap();
    tb.tick().unwrap();
    tb.prep(|checker, sim| checker.prep_image(sim, &[4, 5, 6])).unwrap();
    tb.tick().unwrap();

    let mut seen = Vec::new();
    for _ in 0..20 {
        let cycle = tb.cycle();
        let value = result(&tb.tick().unwrap(), config.result_width());
        if value != 0 {
            seen.push((cycle - start, value));
        }
    }
    assert_eq!(seen, vec![(18, 2), (19, 18)]);
}

#[test]
fn test_slice_partial_spans_idle_cycles() {
    let config = SliceConfig::default();
    let mut tb = Testbench::new(SliceDevice::new(&config), SliceChecker::new(&config).unwrap());
    tb.send_weight(&[1, -1, 3]).unwrap();
    tb.prep(|checker, sim| checker.prep_image(sim, &[10, 20, 30])).unwrap();
    tb.tick().unwrap();
    tb.advance_clock(5).unwrap();
    tb.prep(|checker, sim| checker.prep_image(sim, &[-4, 0, 0])).unwrap();
    tb.tick().unwrap();
    tb.advance_clock(25).unwrap();
    // 10, then (-20 + 90) - 4
    assert_eq!(tb.checker.stats().nonzero_matches, 2);
}

#[test]
fn test_slice_weights_past_128_lanes() {
    let config = SliceConfig {
        mac_count: 200,
        ..Default::default()
    };
    let mut tb = Testbench::new(SliceDevice::new(&config), SliceChecker::new(&config).unwrap());
    tb.send_weight(&[1; 200]).unwrap();

    let mut beat = vec![0; 200];
    beat[0] = 1;
    beat[150] = 7;
    beat[199] = 2;
    tb.prep(|checker, sim| checker.prep_image(sim, &beat)).unwrap();
    tb.tick().unwrap();
    assert_eq!(tb.checker.partial(), 9);

    tb.prep(|checker, sim| checker.prep_image(sim, &[0; 200])).unwrap();
    tb.tick().unwrap();
    tb.advance_clock(20).unwrap();
    // 1 on the first beat, then the carried 7 + 2
    assert_eq!(tb.checker.stats().nonzero_matches, 2);
}

#[test]
fn test_engine_contiguous_beats() {
    let mut tb = engine_bench();
    let start = tb.cycle();
    let beats: [Vec<i128>; 2] = [[1, 2, 3].repeat(3), [4, 5, 6].repeat(3)];
    for beat in &beats {
        tb.prep(|checker, sim| checker.prep_image(sim, beat)).unwrap();
        tb.tick().unwrap();
    }

    let observed = tb.advance_clock(26).unwrap();
    assert_eq!(tb.cycle() - start, 28);
    assert_eq!(result(&observed, 48), 0);
    let first = tb.tick().unwrap();
    assert_eq!(result(&first, 48), word(&[3, 9, 18]));
    let second = tb.tick().unwrap();
    assert_eq!(result(&second, 48), word(&[27, 36, 45]));
}

#[test]
fn test_engine_window_reads_whole_beat() {
    let mut tb = engine_bench();
    let beats: [Vec<i128>; 2] = [
        vec![1, 2, 3, 10, 20, 30, 100, 200, 300],
        vec![4, 5, 6, 40, 50, 60, 400, 500, 600],
    ];
    for beat in &beats {
        tb.prep(|checker, sim| checker.prep_image(sim, beat)).unwrap();
        tb.tick().unwrap();
    }

    tb.advance_clock(26).unwrap();
    let first = tb.tick().unwrap();
    assert_eq!(result(&first, 48), word(&[30, 90, 180]));
    let second = tb.tick().unwrap();
    assert_eq!(result(&second, 48), word(&[135, 279, 450]));
    assert_eq!(tb.checker.stats().nonzero_matches, 2);
}

#[test]
fn test_engine_fewer_channels_than_taps() {
    let config = EngineConfig {
        image_count: 2,
        ..Default::default()
    };
    let mut tb = Testbench::new(EngineDevice::new(&config), EngineChecker::new(&config).unwrap());
    tb.send_shift(0).unwrap();
    tb.send_weight(&[1; 9]).unwrap();

    tb.prep(|checker, sim| checker.prep_image(sim, &[1, 2, 3, 4, 5, 6])).unwrap();
    tb.tick().unwrap();
    tb.advance_clock(27).unwrap();
    let observed = tb.tick().unwrap();
    assert_eq!(result(&observed, 32), word(&[12, 27]));
}

#[test]
fn test_engine_intermittent_beats() {
    let mut tb = engine_bench();
    let start = tb.cycle();
    let first: Vec<i128> = [1, 2, 3].repeat(3);
    let second: Vec<i128> = [4, 5, 6].repeat(3);

    tb.prep(|checker, sim| checker.prep_image(sim, &first)).unwrap();
    tb.tick().unwrap();
    tb.advance_clock(3).unwrap();
    tb.prep(|checker, sim| checker.prep_image(sim, &second)).unwrap();
    tb.tick().unwrap();

    let mut seen = Vec::new();
    for _ in 0..40 {
        let cycle = tb.cycle();
        let value = result(&tb.tick().unwrap(), 48);
        if value != 0 {
            seen.push((cycle - start, value));
        }
    }
    assert_eq!(seen, vec![(28, word(&[3, 9, 18])), (32, word(&[27, 36, 45]))]);
}

#[test]
fn test_engine_reset_keeps_shift() {
    let config = EngineConfig::default();
    let mut tb = Testbench::new(EngineDevice::new(&config), EngineChecker::new(&config).unwrap());
    tb.send_shift(2).unwrap();
    tb.apply_reset(1, 1).unwrap();
    assert_eq!(tb.checker.shift(), 2);

    tb.send_weight(&[1; 9]).unwrap();
    let beat: Vec<i128> = vec![4; 9];
    tb.prep(|checker, sim| checker.prep_image(sim, &beat)).unwrap();
    tb.tick().unwrap();
    tb.advance_clock(30).unwrap();
    assert_eq!(tb.checker.stats().nonzero_matches, 1);
}

#[test]
fn test_engine_shift_out_of_range_clocks_nothing() {
    let mut tb = engine_bench();
    let before = tb.cycle();
    assert!(tb.send_shift(200).is_err());
    assert_eq!(tb.cycle(), before);
    assert_eq!(tb.checker.shift(), 0);
}

#[test]
fn test_random_regressions_pass() {
    let config = OracleConfig::default();
    for block in Block::ALL {
        let scenario = Scenario {
            block,
            seed: 2024,
            stimulus: StimulusConfig {
                beats: 100,
                valid_probability: 0.6,
                reset_at: Some(50),
            },
            fault: None,
        };
        let report = run(&config, &scenario).unwrap();
        assert!(report.passed, "{block}: {:?}", report.failure);
        assert_eq!(report.beats, 100);
        assert!(report.stats.reset_cycles >= 3);
    }
}

#[test]
fn test_small_preset_sweep() {
    let scenario = Scenario {
        block: Block::Engine,
        seed: 0,
        stimulus: StimulusConfig {
            beats: 20,
            valid_probability: 0.8,
            reset_at: None,
        },
        fault: None,
    };
    let seeds: Vec<u64> = (0..8).collect();
    let report = sweep(&OracleConfig::small(), &scenario, &seeds).unwrap();
    assert!(report.passed());
    assert_eq!(report.runs.len(), 8);
}
