//! Whole-script processing: files, comments, clock discipline, and the JSON
//! dump rendering.

use std::io::Write as _;

use minikv::driver::Driver;

#[test]
fn test_script_file_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "// basic commit visibility").unwrap();
    writeln!(file, "begin(T1)").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "W(T1,x1,101)").unwrap();
    writeln!(file, "end(T1)").unwrap();
    writeln!(file, "dump()").unwrap();

    let mut driver = Driver::new();
    let output = driver.run_file(file.path()).unwrap();

    assert_eq!(output.len(), 4); // comment and blank lines produce nothing
    assert_eq!(output[0], "Began Tx T1 with time_stamp 1");
    assert!(output[3].contains("site 2: x1=101 (T1)"));
}

#[test]
fn test_comments_do_not_advance_the_clock() {
    let mut driver = Driver::new();
    driver
        .run_script("// setup\n\nbegin(T1)\n// still time 1\nbegin(T2)")
        .unwrap();

    assert_eq!(driver.coordinator().registry().timestamp("T1"), Some(1));
    assert_eq!(driver.coordinator().registry().timestamp("T2"), Some(2));
}

#[test]
fn test_bad_line_stops_the_script() {
    let mut driver = Driver::new();
    let result = driver.run_script("begin(T1)\nfrob(T1)\nbegin(T2)");
    assert!(result.is_err());
    // The first command ran before the parse error
    assert!(driver.coordinator().registry().contains("T1"));
    assert!(!driver.coordinator().registry().contains("T2"));
}

#[test]
fn test_missing_file_is_an_io_error() {
    let mut driver = Driver::new();
    assert!(driver.run_file("/nonexistent/script.txt").is_err());
}

#[test]
fn test_json_dump_contains_sites_and_values() {
    let mut driver = Driver::new();
    driver
        .run_script("begin(T1)\nW(T1,x2,202)\nend(T1)\nfail(4)")
        .unwrap();

    let json = driver.dump_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["sites"]["1"]["variables"]["x2"]["value"], 202);
    assert_eq!(value["sites"]["1"]["variables"]["x2"]["writer"], "T1");
    assert_eq!(value["sites"]["4"]["up"], false);
    assert_eq!(value["sites"]["5"]["up"], true);
}

#[test]
fn test_full_session_transcript() {
    // A longer mixed session exercising replication, waiting, and recovery
    let script = "\
begin(T1)
begin(T2)
W(T1,x2,10)
R(T2,x2)
end(T1)
end(T2)
fail(1)
begin(T3)
R(T3,x2)
recover(1)
dump()";

    let mut driver = Driver::new();
    let output = driver.run_script(script).unwrap();

    // T2's read waits for T1's lock, then the commit replay serves it
    assert!(output[3].contains("Waitlisted Tx T2"));
    assert!(output[4].contains("Ended Tx T1"));
    assert!(output[4].contains("value: 10"));
    // T3 reads from site 2 while site 1 is down
    assert!(output[8].contains("value: 10"));
    // Every site shows the committed replicated value in the final dump
    let dump = output.last().unwrap();
    assert!(dump.contains("site 1: x2=10 (T1)"));
    assert!(dump.contains("site 10: x2=10 (T1)"));
}
