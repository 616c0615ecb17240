use std::process::Command;

fn observation_log() -> String {
    // 2x2 opaque gray tile.
    let payload = |v: u8| format!("[{}]", vec![format!("{v},{v},{v},255"); 4].join(","));
    [
        "# two tiles facing north, side by side".to_string(),
        r#"{"kind":"placement","entity_id":1,"coordinate":{"x":0,"y":64,"z":0},"direction":"north","tile_id":10}"#.to_string(),
        r#"{"kind":"placement","entity_id":2,"coordinate":{"x":1,"y":64,"z":0},"direction":"north","tile_id":11}"#.to_string(),
        format!(r#"{{"kind":"buffer","tile_id":10,"payload":{}}}"#, payload(200)),
        "not json at all".to_string(),
        format!(r#"{{"kind":"buffer","tile_id":11,"payload":{}}}"#, payload(100)),
    ]
    .join("\n")
}

#[test]
fn replay_writes_one_png_per_composite() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("observations.jsonl");
    let output = dir.path().join("out");
    std::fs::write(&input, observation_log()).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_mosaic_replay"))
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .arg("--tile-size")
        .arg("2")
        .status()
        .expect("replay binary runs");
    assert!(status.success());

    let written: Vec<_> = std::fs::read_dir(&output).unwrap().collect();
    assert_eq!(written.len(), 1);

    let image = image::open(output.join("north_0.png")).unwrap().into_rgba8();
    assert_eq!(image.dimensions(), (4, 2));
    assert_eq!(image.get_pixel(0, 0).0, [200, 200, 200, 255]);
    assert_eq!(image.get_pixel(3, 1).0, [100, 100, 100, 255]);
}

#[test]
fn replay_fails_on_missing_log() {
    let dir = tempfile::tempdir().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_mosaic_replay"))
        .arg(dir.path().join("missing.jsonl"))
        .arg("--output")
        .arg(dir.path().join("out"))
        .status()
        .expect("replay binary runs");
    assert!(!status.success());
}
