//! Integration tests for one-epoch SOM training.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use somreduce::storage::{
    decode_emission, encode_emission, read_partitions, read_updates, write_updates,
};
use somreduce::{
    DegeneratePolicy, EpochConfig, EpochRunner, InstanceCounter, MapTask, NeuronGrid, Reducer,
    SomError, UpdateOutcome,
};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// Creates two well-separated clusters of 2D points.
fn create_clustered_records(n: usize, seed: u64) -> Vec<String> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let centre = if i % 2 == 0 { (-1.0, -1.0) } else { (1.0, 1.0) };
            let x: f64 = centre.0 + rng.gen_range(-0.2..0.2);
            let y: f64 = centre.1 + rng.gen_range(-0.2..0.2);
            format!("{},{}", x, y)
        })
        .collect()
}

fn write_weights(dir: &Path, grid: &NeuronGrid) -> std::path::PathBuf {
    let path = dir.join("weights.txt");
    grid.save(&path).unwrap();
    path
}

#[test]
fn test_end_to_end_epoch() {
    let dir = tempdir().unwrap();
    let grid = NeuronGrid::random(16, 2, Some(42)).unwrap();
    let weights = write_weights(dir.path(), &grid);

    let input = dir.path().join("input.csv");
    fs::write(&input, create_clustered_records(200, 7).join("\n")).unwrap();

    let config = EpochConfig::new(16, 2, 1.0, 500.0, &weights);
    let loaded = config.load_grid().unwrap();
    assert_eq!(loaded, grid);

    let partitions = read_partitions(&input, 4).unwrap();
    assert_eq!(partitions.len(), 4);

    let output = EpochRunner::new(&config, &loaded)
        .unwrap()
        .run(&partitions)
        .unwrap();
    assert_eq!(output.instances(), 200);
    assert_eq!(output.updates.len(), 16);

    let out_dir = dir.path().join("out");
    let part = write_updates(&out_dir, &output.updates).unwrap();
    let text = fs::read_to_string(&part).unwrap();
    assert_eq!(text.lines().count(), 16);
    assert!(!text.contains("NaN") && !text.contains("inf"));

    let next = loaded.apply_updates(&read_updates(&out_dir).unwrap()).unwrap();
    assert_eq!(next, output.next_grid(&loaded).unwrap());
    assert!(next.rows().flatten().all(|w| w.is_finite()));

    // Every updated neuron moved inside the bounding box of the data.
    for row in next.rows() {
        for &w in row {
            assert!((-1.2..=1.2).contains(&w));
        }
    }
}

#[test]
fn test_two_neuron_scenario() {
    let dir = tempdir().unwrap();
    let weights = dir.path().join("weights.txt");
    fs::write(&weights, "0.0\n10.0\n").unwrap();

    let config = EpochConfig::new(2, 1, 1.0, 100.0, &weights);
    let grid = config.load_grid().unwrap();
    assert_eq!(grid.find_bmu(&[1.0]).unwrap(), 0);

    let output = EpochRunner::new(&config, &grid)
        .unwrap()
        .run(&[vec!["1.0".to_string()]])
        .unwrap();
    assert_eq!(output.updates[0].outcome, UpdateOutcome::Updated(vec![1.0]));
}

#[test]
fn test_degenerate_neuron_has_no_nan() {
    let dir = tempdir().unwrap();
    // Neuron 2 is far from everything; at a late instance count its
    // activation underflows to exactly zero for every input.
    let grid = NeuronGrid::from_rows(vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![50.0, 50.0]]).unwrap();
    let weights = write_weights(dir.path(), &grid);
    let records = vec!["0.1,0.0".to_string(), "0.9,1.0".to_string()];

    for policy in [DegeneratePolicy::RetainPrevious, DegeneratePolicy::MarkInactive] {
        let mut config = EpochConfig::new(3, 2, 1.0, 10.0, &weights);
        config.counter_baseline = 100;
        config.degenerate_policy = policy;

        let output = EpochRunner::new(&config, &grid)
            .unwrap()
            .run(&[records.clone()])
            .unwrap();
        assert_eq!(output.degenerate(), vec![2]);

        let out_dir = dir.path().join(format!("out-{:?}", policy));
        let part = write_updates(&out_dir, &output.updates).unwrap();
        let text = fs::read_to_string(part).unwrap();
        assert!(!text.contains("NaN") && !text.contains("inf"));

        let next = output.next_grid(&grid).unwrap();
        assert_eq!(next.neuron(2), &[50.0, 50.0]);
        assert!(next.rows().flatten().all(|w| w.is_finite()));
    }

    let mut config = EpochConfig::new(3, 2, 1.0, 10.0, &weights);
    config.counter_baseline = 100;
    config.degenerate_policy = DegeneratePolicy::Fail;
    assert!(matches!(
        EpochRunner::new(&config, &grid).unwrap().run(&[records]),
        Err(SomError::DegenerateReduce { neuron: 2 })
    ));
}

#[test]
fn test_streaming_wire_matches_local_engine() {
    let grid = NeuronGrid::random(9, 2, Some(5)).unwrap();
    let config = EpochConfig::new(9, 2, 0.8, 50.0, "unused");
    let records = create_clustered_records(40, 11);

    // Mapper writes text emissions, as a streaming job would.
    let mut task = MapTask::new(&grid, &config, InstanceCounter::local(0)).unwrap();
    let mut lines = Vec::new();
    task.map_partition(&records, |j, c| lines.push(encode_emission(j, &c)))
        .unwrap();
    assert_eq!(lines.len(), 40 * 9 * 2);

    // Shuffle in reverse to show the reducer does not need sorted input.
    lines.reverse();
    let reducer = Reducer::new(&grid, config.degenerate_policy);
    let mut groups = vec![Vec::new(); 9];
    for line in &lines {
        let (j, c) = decode_emission(line).unwrap();
        groups[j].push(c);
    }

    let local = EpochRunner::new(&config, &grid)
        .unwrap()
        .run(&[records])
        .unwrap();

    for (j, values) in groups.into_iter().enumerate() {
        let streamed = reducer.reduce(j, values).unwrap();
        let expected = local.updates[j].weights().unwrap();
        for (x, y) in streamed.weights().unwrap().iter().zip(expected) {
            assert!((x - y).abs() < 1e-9);
        }
    }
}

#[test]
fn test_repeated_epochs_stay_finite() {
    let mut grid = NeuronGrid::random(4, 2, Some(9)).unwrap();
    let config = EpochConfig::new(4, 2, 1.0, 100.0, "unused");
    let partitions = vec![
        create_clustered_records(30, 1),
        create_clustered_records(30, 2),
    ];

    for _ in 0..3 {
        let output = EpochRunner::new(&config, &grid)
            .unwrap()
            .run(&partitions)
            .unwrap();
        grid = output.next_grid(&grid).unwrap();
        assert!(grid.rows().flatten().all(|w| w.is_finite()));
    }
}

#[test]
fn test_config_errors_halt_before_mapping() {
    let dir = tempdir().unwrap();
    let weights = dir.path().join("weights.txt");
    fs::write(&weights, "0.0 1.0\n2.0 3.0\n").unwrap();

    // Row count mismatch.
    let config = EpochConfig::new(3, 2, 1.0, 100.0, &weights);
    assert!(matches!(config.load_grid(), Err(SomError::Config(_))));

    // Column count mismatch.
    let config = EpochConfig::new(2, 3, 1.0, 100.0, &weights);
    assert!(matches!(config.load_grid(), Err(SomError::Config(_))));

    // Grid that does not match the configuration.
    let grid = NeuronGrid::random(2, 2, Some(1)).unwrap();
    let config = EpochConfig::new(2, 3, 1.0, 100.0, &weights);
    assert!(matches!(
        EpochRunner::new(&config, &grid),
        Err(SomError::Config(_))
    ));
}
