mod common;

use common::{tdump_text, utf8_tempdir, write, SyntheticRun};
use trajclust::convert::{convert_file, strip_diagnostics};
use trajclust::{split_document, FormatError, TdumpDocument};

fn ten_origins() -> Vec<(f64, f64)> {
    (0..10).map(|i| (30.0 + i as f64, 100.0 + i as f64)).collect()
}

#[test]
fn test_full_run_round_trip() {
    let origins = ten_origins();
    let text = tdump_text(&SyntheticRun {
        origins: &origins,
        last_lag: 240,
        humidity_slope: Some(0.01),
    });
    let doc = TdumpDocument::parse(&text).unwrap();
    assert_eq!(doc.serialize(), text);
    assert_eq!(doc.origin_count(), 10);
    assert!(doc.trajectories().iter().all(|t| t.is_complete(240)));
    assert_eq!(doc.layout().humidity_extra_index(), Some(1));

    let parts = split_document(&doc);
    assert_eq!(parts.len(), 10);
    for (i, part) in parts.iter().enumerate() {
        let reparsed = TdumpDocument::parse(&part.serialize()).unwrap();
        assert_eq!(reparsed.trajectories()[0].points(), doc.trajectories()[i].points());
    }
}

#[test]
fn test_second_column_layout() {
    // a running counter in front of the id pushes every field one token to the right
    let origins = ten_origins();
    let text = tdump_text(&SyntheticRun {
        origins: &origins[..2],
        last_lag: 2,
        humidity_slope: None,
    });
    let shifted: String = text
        .lines()
        .enumerate()
        .map(|(n, line)| {
            if n >= 6 {
                format!("{:6}{line}\n", n)
            } else {
                format!("{line}\n")
            }
        })
        .collect();
    let doc = TdumpDocument::parse(&shifted).unwrap();
    assert_eq!(doc.layout().id_column(), 1);
    assert_eq!(doc.trajectory(2).unwrap().points()[0].latitude, 31.0);
    assert_eq!(doc.serialize(), shifted);
}

#[test]
fn test_unknown_id_is_reported_with_line() {
    let origins = ten_origins();
    let mut text = tdump_text(&SyntheticRun {
        origins: &origins[..2],
        last_lag: 120,
        humidity_slope: None,
    });
    // past the id probe window, so the layout still resolves
    text.push_str(
        "     3     1    95     1    15    18     0     0    -2.0   30.000  100.000    500.0    900.0\n",
    );
    assert_eq!(
        TdumpDocument::parse(&text),
        Err(FormatError::UnknownTrajectoryId {
            line: 249,
            id: 3,
            origins: 2
        })
    );
}

#[test]
fn test_convert_extended_run() {
    let (_tmp, root) = utf8_tempdir();
    let origins = ten_origins();
    let text = tdump_text(&SyntheticRun {
        origins: &origins[..2],
        last_lag: 5,
        humidity_slope: Some(0.1),
    });
    let path = write(&root.join("tdump_95011506"), &text);

    let out = convert_file(&path).unwrap();
    assert_eq!(out.file_name(), Some("tdump_95011506_tmp"));
    let plain = TdumpDocument::from_file(&out).unwrap();
    assert_eq!(plain.marker().names(), ["PRESSURE".to_string()]);
    assert!(plain
        .trajectories()
        .iter()
        .flat_map(|t| t.points())
        .all(|p| p.extra_fields == vec![900.0]));

    let doc = TdumpDocument::parse(&text).unwrap();
    assert_eq!(
        strip_diagnostics(&doc).unwrap().serialize(),
        std::fs::read_to_string(&out).unwrap()
    );
}
