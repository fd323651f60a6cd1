use lasergate::{Config, GcodeFile, JobSource, StreamConfig};
use std::io::Write;
use std::time::Duration;

#[test]
fn test_config_file_drives_engine_parameters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[connection]\nport = \"/dev/ttyACM0\"\nbaud_rate = 250000\n\n[streaming]\nstatus_poll_ms = 100\n",
    )
    .unwrap();

    let config = Config::load_from_file(&path).unwrap();

    let params = config.connection.to_params(None);
    assert_eq!(params.port, "/dev/ttyACM0");
    assert_eq!(params.baud_rate, 250_000);
    assert_eq!(config.connection.to_params(Some("COM7")).port, "COM7");

    let stream = config.streaming.to_stream_config();
    assert_eq!(stream.status_poll, Duration::from_millis(100));
    assert_eq!(stream.rx_buffer_size, StreamConfig::default().rx_buffer_size);
    assert_eq!(stream.max_line_len(), 127);
}

#[test]
fn test_gcode_file_keeps_raw_lines_for_the_engine() {
    let mut file = tempfile::Builder::new().suffix(".gcode").tempfile().unwrap();
    writeln!(file, "G21 ; millimetres").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "G1 X10 F600").unwrap();

    let mut job = GcodeFile::new(file.path());
    let lines = job.lines().unwrap();
    assert_eq!(lines, vec!["G21 ; millimetres", "", "G1 X10 F600"]);
    assert!(job.name().ends_with(".gcode"));
}
