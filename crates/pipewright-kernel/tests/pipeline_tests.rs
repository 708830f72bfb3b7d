//! End-to-end tests: real shell children and filter tasks in one chain.
//!
//! These need `/bin/sh` and the usual coreutils (`printf`, `head`, `wc`,
//! `sort`, `yes`).

use std::io;
use std::time::Duration;

use pipewright_kernel::filters::{
    CaptureLines, CaptureText, CountLines, MountFilter, MountLayout, PassThrough,
};
use pipewright_kernel::{
    async_trait, Chain, Encoding, EngineConfig, Filter, FilterInput, FilterOutput, PipelineError,
    Stage, StageInput,
};
use rstest::rstest;

/// Upper bound for tests that would hang if a pipe deadlocked.
const DEADLOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Writes numbered lines without reading its input; endless when `lines` is
/// `None`.
struct Generate {
    lines: Option<usize>,
    written: usize,
}

impl Generate {
    fn new(lines: usize) -> Self {
        Self {
            lines: Some(lines),
            written: 0,
        }
    }

    fn endless() -> Self {
        Self {
            lines: None,
            written: 0,
        }
    }
}

#[async_trait]
impl Filter for Generate {
    async fn process(
        &mut self,
        _stdin: &mut FilterInput,
        stdout: &mut FilterOutput,
        _stderr: &mut FilterOutput,
    ) -> io::Result<()> {
        self.written = 0;
        while self.lines.is_none_or(|n| self.written < n) {
            stdout.write_str(&format!("line {}\n", self.written)).await?;
            self.written += 1;
        }
        Ok(())
    }
}

/// Writes one line, then fails.
struct Fail;

#[async_trait]
impl Filter for Fail {
    async fn process(
        &mut self,
        _stdin: &mut FilterInput,
        stdout: &mut FilterOutput,
        _stderr: &mut FilterOutput,
    ) -> io::Result<()> {
        stdout.write_str("partial\n").await?;
        Err(io::Error::other("boom"))
    }
}

/// Writes one line, then panics.
struct Boom;

#[async_trait]
impl Filter for Boom {
    async fn process(
        &mut self,
        _stdin: &mut FilterInput,
        stdout: &mut FilterOutput,
        _stderr: &mut FilterOutput,
    ) -> io::Result<()> {
        stdout.write_str("partial\n").await?;
        panic!("filter blew up");
    }
}

/// Reads its whole input, then fails.
struct DrainThenFail;

#[async_trait]
impl Filter for DrainThenFail {
    async fn process(
        &mut self,
        stdin: &mut FilterInput,
        _stdout: &mut FilterOutput,
        _stderr: &mut FilterOutput,
    ) -> io::Result<()> {
        stdin.read_bytes().await?;
        Err(io::Error::other("late failure"))
    }
}

async fn run(chain: &mut Chain, input: StageInput) {
    tokio::time::timeout(DEADLOCK_TIMEOUT, chain.execute_with(input))
        .await
        .expect("pipeline timed out")
        .expect("pipeline failed");
}

fn captured(chain: &Chain) -> &str {
    chain
        .filter::<CaptureText>()
        .expect("chain should end in CaptureText")
        .text()
}

// ============================================================================
// Linking
// ============================================================================

#[test]
fn find_head_from_every_position() {
    let chain = Stage::sh("a")
        | Stage::filter(CountLines::default())
        | Stage::sh("c")
        | Stage::sh("d");
    let ids = chain.stage_ids();
    assert_eq!(ids.len(), 4);
    for id in &ids {
        assert_eq!(chain.find_head(*id), ids[0]);
    }
    assert_eq!(chain.to_string(), "a | CountLines | c | d");
}

#[test]
fn building_starts_nothing() {
    let chain = Stage::sh("exit 99") | Stage::sh("false");
    assert_eq!(chain.exit_status(), None);
}

// ============================================================================
// Exit status
// ============================================================================

#[tokio::test]
async fn execute_returns_the_same_chain() {
    let mut chain = Stage::sh("true") | Stage::sh("exit 5");
    let before: *const Chain = &chain;
    let returned = chain.execute_with(StageInput::Null).await.unwrap();
    assert!(std::ptr::eq(before, &*returned));
    assert_eq!(returned.exit_status(), Some(5));
}

#[rstest]
#[case::last_fails("true", "exit 5", 5)]
#[case::first_fails("exit 7", "cat", 0)]
#[case::both_succeed("true", "true", 0)]
#[tokio::test]
async fn last_stage_wins(#[case] first: &str, #[case] second: &str, #[case] expected: i32) {
    let mut chain = Stage::sh(first) | Stage::sh(second);
    run(&mut chain, StageInput::Null).await;
    assert_eq!(chain.exit_status(), Some(expected));
}

#[tokio::test]
async fn trailing_filter_counts_as_success() {
    let mut chain = Stage::sh("exit 3") | Stage::filter(CaptureText::default());
    run(&mut chain, StageInput::Null).await;
    assert_eq!(chain.exit_status(), Some(0));
}

// ============================================================================
// Data flow
// ============================================================================

#[tokio::test]
async fn external_output_reaches_filter_unchanged() {
    let mut chain =
        Stage::sh("printf 'hello\\nworld\\n'") | Stage::filter(CaptureText::default());
    run(&mut chain, StageInput::Null).await;
    assert_eq!(captured(&chain), "hello\nworld\n");
}

#[tokio::test]
async fn external_to_external_through_os_pipe() {
    let mut chain = Stage::sh("printf 'b\\na\\nc\\n'")
        | Stage::sh("sort")
        | Stage::filter(CaptureText::default());
    run(&mut chain, StageInput::Null).await;
    assert_eq!(captured(&chain), "a\nb\nc\n");
}

#[tokio::test]
async fn capture_keeps_unterminated_tail() {
    let mut chain = Stage::sh("printf 'a\\nb'") | Stage::filter(CaptureText::default());
    run(&mut chain, StageInput::Null).await;
    assert_eq!(captured(&chain), "a\nb");
}

#[rstest]
#[case::empty(0)]
#[case::one(1)]
#[case::some(10)]
#[case::many(5000)]
#[tokio::test]
async fn count_lines_counts_every_line(#[case] lines: usize) {
    let mut chain = Stage::sh(format!("yes line | head -n {lines}"))
        | Stage::filter(CountLines::default())
        | Stage::filter(CaptureText::default());
    run(&mut chain, StageInput::Null).await;
    assert_eq!(chain.find::<CountLines>().unwrap().count(), lines);
    assert_eq!(captured(&chain), format!("{lines}\n"));
}

#[tokio::test]
async fn bytes_input_feeds_head_filter() {
    let mut chain = Stage::filter(CountLines::default()) | Stage::filter(CaptureText::default());
    run(&mut chain, StageInput::bytes("x\ny\nz")).await;
    assert_eq!(chain.find::<CountLines>().unwrap().count(), 3);
}

#[tokio::test]
async fn line_filter_gets_lines_with_terminators() {
    let mut chain = Stage::sh("printf 'a\\nb\\nc'") | Stage::lines(CaptureLines::default());
    run(&mut chain, StageInput::Null).await;
    let lines = chain.filter::<CaptureLines>().unwrap().lines();
    assert_eq!(lines, ["a\n", "b\n", "c"]);
}

#[tokio::test]
async fn results_are_fresh_on_every_run() {
    let mut chain = Stage::sh("printf '1\\n2\\n'") | Stage::filter(CountLines::default());
    for _ in 0..2 {
        run(&mut chain, StageInput::Null).await;
        assert_eq!(chain.filter::<CountLines>().unwrap().count(), 2);
    }
}

// ============================================================================
// Large streams and early exit
// ============================================================================

#[tokio::test]
async fn megabytes_through_a_filter_do_not_deadlock() {
    let size = 2 * 1024 * 1024;
    let mut chain = Stage::sh(format!("head -c {size} /dev/zero"))
        | Stage::filter(PassThrough::default())
        | Stage::sh("wc -c")
        | Stage::filter(CaptureText::default());
    run(&mut chain, StageInput::Null).await;
    assert_eq!(captured(&chain).trim(), size.to_string());
    assert_eq!(chain.find::<PassThrough>().unwrap().bytes(), size as u64);
}

#[tokio::test]
async fn filter_generator_feeds_external_stage() {
    let mut chain = Stage::filter(Generate::new(20_000))
        | Stage::sh("wc -l")
        | Stage::filter(CaptureText::default());
    run(&mut chain, StageInput::Null).await;
    assert_eq!(captured(&chain).trim(), "20000");
}

#[tokio::test]
async fn tiny_pipe_capacity_still_streams() {
    let config = EngineConfig::default().with_pipe_capacity(16);
    let mut chain = (Stage::filter(Generate::new(1000))
        | Stage::filter(CountLines::default())
        | Stage::filter(CaptureText::default()))
    .with_config(config);
    run(&mut chain, StageInput::Null).await;
    assert_eq!(chain.find::<CountLines>().unwrap().count(), 1000);
}

#[tokio::test]
async fn endless_producer_stops_when_reader_exits() {
    let mut chain =
        Stage::sh("yes") | Stage::sh("head -n 1") | Stage::filter(CaptureText::default());
    run(&mut chain, StageInput::Null).await;
    assert_eq!(captured(&chain), "y\n");
    assert_eq!(chain.exit_status(), Some(0));
}

#[tokio::test]
async fn endless_filter_stops_when_reader_exits() {
    let mut chain = Stage::filter(Generate::endless())
        | Stage::sh("head -n 2")
        | Stage::filter(CaptureText::default());
    run(&mut chain, StageInput::Null).await;
    assert_eq!(captured(&chain), "line 0\nline 1\n");
    assert!(chain.find::<Generate>().unwrap().written >= 2);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn failing_filter_closes_its_pipe() {
    let mut chain =
        Stage::filter(Fail) | Stage::sh("cat") | Stage::filter(CaptureText::default());
    let err = tokio::time::timeout(DEADLOCK_TIMEOUT, chain.execute_with(StageInput::Null))
        .await
        .expect("pipeline timed out")
        .unwrap_err();

    match err {
        PipelineError::Filter { stage, source } => {
            assert_eq!(stage, "Fail");
            assert_eq!(source.to_string(), "boom");
        }
        other => panic!("expected a filter error, got {other:?}"),
    }
    // Downstream saw EOF after the partial output and finished normally.
    assert_eq!(captured(&chain), "partial\n");
    assert_eq!(chain.exit_status(), None);
}

#[tokio::test]
async fn strict_utf8_rejects_invalid_input() {
    let mut chain = Chain::from(Stage::filter(CaptureText::default()));
    let err = chain
        .execute_with(StageInput::bytes(vec![b'c', 0xE9]))
        .await
        .unwrap_err();
    match err {
        PipelineError::Filter { source, .. } => {
            assert_eq!(source.kind(), io::ErrorKind::InvalidData)
        }
        other => panic!("expected a filter error, got {other:?}"),
    }
}

#[tokio::test]
async fn panicking_filter_closes_its_pipe() {
    let mut chain =
        Stage::filter(Boom) | Stage::sh("cat") | Stage::filter(CaptureText::default());
    let err = tokio::time::timeout(DEADLOCK_TIMEOUT, chain.execute_with(StageInput::Null))
        .await
        .expect("pipeline timed out")
        .unwrap_err();

    assert!(
        matches!(&err, PipelineError::WorkerPanicked { stage } if stage == "Boom"),
        "expected a panicked worker, got {err:?}"
    );
    assert_eq!(captured(&chain), "partial\n");
    assert_eq!(chain.exit_status(), None);
}

#[tokio::test]
async fn spawn_failure_stops_running_upstream_child() {
    let mut chain = Stage::sh("yes")
        | Stage::sh("cat").cwd("/definitely/missing")
        | Stage::filter(CaptureText::default());
    let err = tokio::time::timeout(DEADLOCK_TIMEOUT, chain.execute_with(StageInput::Null))
        .await
        .expect("pipeline timed out")
        .unwrap_err();

    assert!(
        matches!(&err, PipelineError::Spawn { command, .. } if command == "cat"),
        "expected a spawn error, got {err:?}"
    );
    assert_eq!(chain.exit_status(), None);
}

#[tokio::test]
async fn spawn_failure_stops_running_upstream_filter() {
    let mut chain = Stage::filter(Generate::endless())
        | Stage::sh("cat").cwd("/definitely/missing")
        | Stage::filter(CaptureText::default());
    let err = tokio::time::timeout(DEADLOCK_TIMEOUT, chain.execute_with(StageInput::Null))
        .await
        .expect("pipeline timed out")
        .unwrap_err();

    assert!(
        matches!(&err, PipelineError::Spawn { command, .. } if command == "cat"),
        "expected a spawn error, got {err:?}"
    );
    assert_eq!(chain.exit_status(), None);
}

#[tokio::test]
async fn finished_upstream_filter_survives_downstream_failure() {
    let mut chain = Stage::filter(PassThrough::default()) | Stage::filter(DrainThenFail);

    for _ in 0..2 {
        let err = chain
            .execute_with(StageInput::bytes("abc"))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, PipelineError::Filter { stage, .. } if stage == "DrainThenFail"),
            "expected the downstream filter error, got {err:?}"
        );
        assert_eq!(chain.find::<PassThrough>().unwrap().bytes(), 3);
    }
}

// ============================================================================
// Stage options
// ============================================================================

#[tokio::test]
async fn cwd_applies_to_its_stage() {
    let mut chain = Stage::sh("pwd").cwd("/") | Stage::filter(CaptureText::default());
    run(&mut chain, StageInput::Null).await;
    assert_eq!(captured(&chain), "/\n");
}

#[tokio::test]
async fn latin1_stage_decodes_high_bytes() {
    let mut chain = Chain::from(Stage::filter(CaptureText::default()).enc(Encoding::Latin1));
    run(&mut chain, StageInput::bytes(vec![b'c', b'a', b'f', 0xE9])).await;
    assert_eq!(captured(&chain), "café");
}

#[tokio::test]
async fn buffer_hint_does_not_change_output() {
    let mut chain = Stage::sh("tr a-z A-Z").buffer_hint(3)
        | Stage::filter(CaptureText::default());
    run(&mut chain, StageInput::bytes("pipes all the way down\n")).await;
    assert_eq!(captured(&chain), "PIPES ALL THE WAY DOWN\n");
}

// ============================================================================
// Mount filtering
// ============================================================================

#[tokio::test]
async fn mount_filter_keeps_real_filesystems() {
    let mut chain = Stage::sh("printf '/dev/sda1 / ext4 rw,relatime\\ntmpfs /tmp tmpfs rw\\n'")
        | Stage::lines(MountFilter::default())
        | Stage::filter(CaptureText::default());
    run(&mut chain, StageInput::Null).await;

    assert_eq!(captured(&chain), "/dev/sda1 / ext4 rw,relatime\n");
    let mounts = chain.find::<MountFilter>().unwrap().mounts();
    assert_eq!(mounts.len(), 1);
    assert_eq!(mounts[0].device, "/dev/sda1");
    assert_eq!(mounts[0].mountpoint, "/");
    assert_eq!(mounts[0].fs_type, "ext4");
}

#[tokio::test]
async fn mount_filter_reads_mount_command_layout() {
    let listing = "/dev/nvme0n1p2 on /home type btrfs (rw,noatime)\n\
                   sysfs on /sys type sysfs (rw,nosuid)\n";
    let mut chain = Stage::lines(MountFilter::new(MountLayout::Command))
        | Stage::filter(CaptureText::default());
    run(&mut chain, StageInput::bytes(listing)).await;

    assert_eq!(captured(&chain), "/dev/nvme0n1p2 on /home type btrfs (rw,noatime)\n");
    let mounts = chain.find::<MountFilter>().unwrap().mounts();
    assert_eq!(mounts[0].mountpoint, "/home");
    assert_eq!(mounts[0].fs_type, "btrfs");
}
