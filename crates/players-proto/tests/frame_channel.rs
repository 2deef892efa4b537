use players_proto::channel::{FrameTail, FramedFileChannel};
use players_proto::protocol::{decode_frame, encode_frame, frame_body};
use players_proto::state::PlaybackSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL: Duration = Duration::from_millis(5);

fn source(title: &str, position: i64) -> PlaybackSource {
    PlaybackSource {
        name: "mpv".to_string(),
        artist: "Artist".to_string(),
        album: String::new(),
        title: title.to_string(),
        playing: true,
        position,
        length: 200_000_000,
        duplicate: false,
    }
}

async fn next(tail: &mut FrameTail) -> String {
    tokio::time::timeout(Duration::from_secs(5), tail.next_frame())
        .await
        .expect("timed out waiting for frame")
        .expect("tail failed")
}

#[test]
fn shorter_frame_leaves_no_residue() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("players-bar.out");
    let mut channel = FramedFileChannel::create(&path).unwrap();

    channel.write_frame(b"a fairly long first frame\n").unwrap();
    channel.write_frame(b"short\n").unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "short\n");
}

#[test]
fn create_truncates_leftover_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("players-bar.out");
    std::fs::write(&path, "stale frame from a crashed primary").unwrap();

    let channel = FramedFileChannel::create(&path).unwrap();
    assert_eq!(channel.path(), path.as_path());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
}

#[tokio::test]
async fn reader_sees_each_complete_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("players-bar.out");
    let mut channel = FramedFileChannel::create(&path).unwrap();
    let mut tail = FrameTail::new(&path, POLL);

    let frames = [
        "{\"text\":\"▶ Artist - A much longer title than the next one\"}\n",
        "{\"text\":\" Artist - B\"}\n",
        "{\"text\":\"▶ Artist - C, long again\"}\n",
    ];
    for frame in frames {
        channel.write_frame(frame.as_bytes()).unwrap();
        assert_eq!(next(&mut tail).await, frame);
    }
}

#[tokio::test]
async fn reader_decodes_data_frames_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("players-bar.data");
    let mut channel = FramedFileChannel::create(&path).unwrap();
    let mut tail = FrameTail::new(&path, POLL);

    for (title, position) in [("First track", 1_000_000), ("2", 2_000_000)] {
        let mut payload = encode_frame(Some(&source(title, position)));
        payload.push('\n');
        channel.write_frame(payload.as_bytes()).unwrap();

        let raw = next(&mut tail).await;
        let decoded = decode_frame(frame_body(&raw)).expect("frame had a source");
        assert_eq!(decoded.title, title);
        assert_eq!(decoded.position, position);
        assert_eq!(decoded.album, "");
    }
}

#[tokio::test]
async fn reader_waits_for_first_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("players-bar.out");
    let mut channel = FramedFileChannel::create(&path).unwrap();
    let mut tail = FrameTail::new(&path, POLL);

    let early = tokio::time::timeout(Duration::from_millis(50), tail.next_frame()).await;
    assert!(early.is_err(), "empty file must not yield a frame");

    channel.write_frame(b"{}\n").unwrap();
    assert_eq!(next(&mut tail).await, "{}\n");
}

#[tokio::test]
async fn reader_fails_when_file_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("players-bar.out");
    let mut channel = FramedFileChannel::create(&path).unwrap();
    let mut tail = FrameTail::new(&path, POLL);

    channel.write_frame(b"{}\n").unwrap();
    next(&mut tail).await;

    std::fs::remove_file(&path).unwrap();
    let err = tokio::time::timeout(Duration::from_secs(5), tail.next_frame())
        .await
        .expect("tail should fail, not hang")
        .unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}

#[tokio::test]
async fn reader_never_sees_a_torn_frame_under_concurrent_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("players-bar.out");
    let long = format!("{}\n", "L".repeat(200));
    let short = format!("{}\n", "S".repeat(20));

    let mut channel = FramedFileChannel::create(&path).unwrap();
    channel.write_frame(short.as_bytes()).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let writer = {
        let stop = stop.clone();
        let (long, short) = (long.clone(), short.clone());
        std::thread::spawn(move || {
            let mut writes = 0u64;
            // Odd bursts, so each pause leaves the other frame in place.
            while !stop.load(Ordering::Relaxed) {
                for _ in 0..201 {
                    let frame = if writes % 2 == 0 { &long } else { &short };
                    channel.write_frame(frame.as_bytes()).unwrap();
                    writes += 1;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            writes
        })
    };

    let mut tail = FrameTail::new(&path, Duration::from_millis(1));
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut frames = 0;
    while Instant::now() < deadline {
        let raw = next(&mut tail).await;
        assert!(raw == long || raw == short, "torn frame: {:?}", raw);
        frames += 1;
    }

    stop.store(true, Ordering::Relaxed);
    let writes = writer.join().unwrap();
    assert!(frames > 0);
    assert!(writes > frames);
}
