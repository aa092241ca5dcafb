use std::path::PathBuf;

fn exe() -> PathBuf {
    std::env::var_os("CARGO_BIN_EXE_slitscan")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "slitscan.exe"
            } else {
                "slitscan"
            });
            p
        })
}

fn write_input(dir: &std::path::Path) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let in_path = dir.join("in.png");
    let img = image::RgbaImage::from_fn(32, 24, |x, y| {
        image::Rgba([(x * 8) as u8, (y * 10) as u8, 90, 255])
    });
    img.save(&in_path).unwrap();
    in_path
}

#[test]
fn cli_frame_writes_png() {
    let dir = PathBuf::from("target").join("cli_smoke");
    let in_path = write_input(&dir);
    let out_path = dir.join("out.png");
    let _ = std::fs::remove_file(&out_path);

    let in_arg = in_path.to_string_lossy().to_string();
    let out_arg = out_path.to_string_lossy().to_string();

    let status = std::process::Command::new(exe())
        .args(["frame", "--in", in_arg.as_str(), "--frame", "12", "--out"])
        .arg(out_arg.as_str())
        .args(["--effect", "slit-scan", "--direction", "spiral", "--intensity", "80"])
        .status()
        .unwrap();

    assert!(status.success());
    let out = image::open(&out_path).unwrap();
    assert_eq!((out.width(), out.height()), (32, 24));
}

#[test]
fn cli_record_writes_png_sequence() {
    let dir = PathBuf::from("target").join("cli_smoke_record");
    let in_path = write_input(&dir);
    let out_dir = dir.join("seq");
    let _ = std::fs::remove_dir_all(&out_dir);

    let in_arg = in_path.to_string_lossy().to_string();
    let out_arg = out_dir.to_string_lossy().to_string();

    let status = std::process::Command::new(exe())
        .args(["record", "--in", in_arg.as_str(), "--out", out_arg.as_str()])
        .args(["--format", "png-sequence", "--seconds", "0.2", "--auto", "--seed", "3"])
        .args(["--effect", "glitch"])
        .status()
        .unwrap();

    assert!(status.success());
    assert!(out_dir.join("frame_0000.png").is_file());
    assert!(out_dir.join("metadata.json").is_file());
}

#[test]
fn cli_rejects_unknown_effect() {
    let dir = PathBuf::from("target").join("cli_smoke_bad");
    let in_path = write_input(&dir);
    let in_arg = in_path.to_string_lossy().to_string();

    let status = std::process::Command::new(exe())
        .args(["frame", "--in", in_arg.as_str(), "--out", "unused.png"])
        .args(["--effect", "slitscan"])
        .status()
        .unwrap();

    assert!(!status.success());
}
