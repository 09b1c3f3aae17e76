//! Read-only transactions: lock-free snapshot reads as of the start
//! timestamp, regardless of later commits.

use minikv::driver::Driver;

#[test]
fn test_read_only_sees_pre_start_commit() {
    let mut driver = Driver::new();
    driver
        .run_script(
            "begin(T1)\nW(T1,x3,77)\nend(T1)\n\
             beginRO(T2)\n\
             begin(T3)\nW(T3,x3,88)\nend(T3)",
        )
        .unwrap();

    // 77 committed before T2 began; 88 after. T2 reads 77.
    let status = driver.execute_line("R(T2,x3)").unwrap().unwrap();
    assert!(status.contains("value: 77"), "got: {}", status);
}

#[test]
fn test_read_only_snapshot_is_stable_across_reads() {
    let mut driver = Driver::new();
    driver
        .run_script("beginRO(T1)\nbegin(T2)\nW(T2,x2,5)\nW(T2,x4,6)\nend(T2)")
        .unwrap();

    // Both reads happen after T2 committed, but T1's snapshot predates it
    let status = driver.execute_line("R(T1,x2)").unwrap().unwrap();
    assert!(status.contains("value: 20"), "got: {}", status);
    let status = driver.execute_line("R(T1,x4)").unwrap().unwrap();
    assert!(status.contains("value: 40"), "got: {}", status);
}

#[test]
fn test_read_only_does_not_block_writers() {
    let mut driver = Driver::new();
    driver.run_script("beginRO(T1)\nR(T1,x2)\nbegin(T2)").unwrap();

    // No read lock was taken, so T2 writes immediately
    let status = driver.execute_line("W(T2,x2,9)").unwrap().unwrap();
    assert!(status.contains("Wrote var x2 for Tx T2"), "got: {}", status);
    assert!(!driver.coordinator().registry().is_waiting("T2"));
}

#[test]
fn test_read_write_sees_latest_committed() {
    let mut driver = Driver::new();
    driver
        .run_script("begin(T1)\nW(T1,x3,77)\nend(T1)\nbegin(T2)\nW(T2,x3,88)\nend(T2)\nbegin(T3)")
        .unwrap();

    let status = driver.execute_line("R(T3,x3)").unwrap().unwrap();
    assert!(status.contains("value: 88"), "got: {}", status);
}

#[test]
fn test_read_only_end_reports_and_terminates() {
    let mut driver = Driver::new();
    driver.run_script("beginRO(T1)\nR(T1,x2)").unwrap();

    let status = driver.execute_line("end(T1)").unwrap().unwrap();
    assert!(status.contains("Ended Tx T1"), "got: {}", status);
    let status = driver.execute_line("R(T1,x2)").unwrap().unwrap();
    assert_eq!(status, "Tx T1 is in aborted state");
}
