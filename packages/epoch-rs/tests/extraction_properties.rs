use epoch_rs::processing::{baseline_mean, percent_change, remove_baseline};
use epoch_rs::{
    align, extract_trial, linear_approx, Axis, Segmenter, SignalStream, TriggerConfig,
    TrialWindow, View,
};

/// Stream with `n` samples at 10 Hz and data equal to the sample index
fn indexed_stream(n: usize) -> SignalStream {
    let ts: Vec<f64> = (0..n).map(|i| i as f64 / 10.0).collect();
    let data: Vec<f64> = (0..n).map(|i| i as f64).collect();
    SignalStream::new(data, ts, 10.0).expect("valid stream")
}

/// Stream with jittered timestamps around a nominal 60 Hz grid
fn jittered_stream(n: usize) -> SignalStream {
    let ts: Vec<f64> = (0..n)
        .map(|i| i as f64 / 60.0 + 0.004 * ((i * 7919 % 13) as f64 / 13.0 - 0.5))
        .collect();
    let data: Vec<f64> = ts.iter().map(|t| 3.0 + (t * 2.0).sin()).collect();
    SignalStream::new(data, ts, 60.0).expect("valid stream")
}

#[test]
fn test_trial_spans_exact_requested_duration() {
    let stream = jittered_stream(600);
    let window = TrialWindow::new(0.37, 1.21);

    for (n, marker) in [1.03, 2.5, 4.444, 7.9].into_iter().enumerate() {
        let alignment = align(&stream, marker).unwrap();
        let trial = extract_trial(&stream, &alignment, marker, &window, n + 1).unwrap();
        let ts = trial.series(View::Original, Axis::Timestamps).unwrap();

        assert!((ts[0] - (marker - 0.37)).abs() < 1e-12);
        assert!((ts[ts.len() - 1] - (marker + 1.21)).abs() < 1e-12);
        assert!(((ts[ts.len() - 1] - ts[0]) - window.duration()).abs() < 1e-9);
        assert!(ts.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn test_tie_break_picks_current_sample() {
    let stream = SignalStream::new(vec![0.0, 10.0], vec![0.0, 1.0], 1.0).unwrap();
    let alignment = align(&stream, 0.5).unwrap();
    assert_eq!(alignment.chosen_index, 1);
    assert!(!alignment.took_previous);
}

#[test]
fn test_linear_approx_reference_point() {
    assert_eq!(linear_approx(0.0, 0.0, 10.0, 1.0, 0.5), 5.0);
}

#[test]
fn test_whole_trial_baseline_is_plain_mean() {
    let stream = jittered_stream(300);
    let alignment = align(&stream, 2.0).unwrap();
    let trial = extract_trial(&stream, &alignment, 2.0, &TrialWindow::new(0.5, 1.0), 1).unwrap();

    let data = trial.series(View::Proc, Axis::Data).unwrap();
    let expected = data.iter().sum::<f64>() / data.len() as f64;
    let mean = baseline_mean(&trial, [0.0, trial.duration()]).unwrap();
    assert!((mean - expected).abs() < 1e-9);
}

#[test]
fn test_zero_baseline_mean_rejects_trial() {
    let zeros = SignalStream::new(vec![0.0; 31], (0..31).map(|i| i as f64 / 10.0).collect(), 10.0).unwrap();
    let alignment = align(&zeros, 1.5).unwrap();
    let mut trials =
        vec![extract_trial(&zeros, &alignment, 1.5, &TrialWindow::new(0.5, 0.5), 1).unwrap()];

    remove_baseline(&mut trials, [0.0, 0.5]).unwrap();
    let rejected = percent_change(&mut trials, "go");

    assert_eq!(rejected, vec![1]);
    assert!(trials[0].rejected);
    assert!(trials[0].series(View::PercentChange, Axis::Data).is_none());
}

#[test]
fn test_end_to_end_uniform_trial() {
    let stream = indexed_stream(51);
    let alignment = align(&stream, 2.5).unwrap();
    assert_eq!(alignment.chosen_index, 25);

    let start = epoch_rs::resolve_boundary(&stream, 25, 2.5, 1.0, epoch_rs::Direction::Backward).unwrap();
    let end = epoch_rs::resolve_boundary(&stream, 25, 2.5, 1.0, epoch_rs::Direction::Forward).unwrap();
    assert_eq!(start.final_index, 15);
    assert_eq!(end.final_index, 35);
    assert_eq!(start.points_from_marker, 10);
    assert_eq!(end.points_from_marker, 10);

    let trial = extract_trial(&stream, &alignment, 2.5, &TrialWindow::new(1.0, 1.0), 1).unwrap();
    let ts = trial.series(View::Original, Axis::Timestamps).unwrap();
    assert_eq!(ts.len(), 21);
    assert_eq!(ts[0], 1.5);
    assert_eq!(ts[20], 3.5);
}

#[test]
fn test_missing_markers_are_counted() {
    let stream = indexed_stream(51);
    let config = TriggerConfig {
        baseline_time: 0.5,
        trial_time: 0.5,
        ..TriggerConfig::default()
    };
    let markers = [-3.0, -0.5, 1.0, 2.0, 3.0, 5.5, 10.0];
    let trigger = Segmenter::new(config).segment(&stream, "go", &markers);

    assert_eq!(trigger.missing_markers, 4);
    assert_eq!(trigger.audit.len(), 3);
    assert_eq!(trigger.trials.len(), 3);
}
