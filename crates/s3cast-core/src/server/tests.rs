use std::net::SocketAddr;
use std::time::{Duration, Instant};

use regex::Regex;
use s3cast_source::{MemorySource, SourceError};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

use super::*;

fn test_config(batch_size: usize, pause_interval: Duration, timestamp: bool) -> ServerConfig {
    ServerConfig {
        bind_host: "127.0.0.1".to_string(),
        bind_port: 0,
        pause_interval,
        batch_size,
        timestamp,
        backlog: 16,
    }
}

fn memory_locator(prefix: &str) -> Locator {
    Locator::new("mem", "bucket", prefix)
}

async fn bind(server: &Server<MemorySource>) -> (TcpListener, SocketAddr) {
    let listener = server.bind().await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    (listener, addr)
}

async fn read_lines(stream: TcpStream) -> Vec<String> {
    let mut reader = BufReader::new(stream);
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await.expect("read line");
        if read == 0 {
            return lines;
        }
        lines.push(line);
    }
}

#[tokio::test]
async fn client_connected_before_start_receives_every_line_in_order() {
    let mut source = MemorySource::new();
    source.insert("bucket", "data/part-0", "a\nb\nc\nd\n");
    let server = Server::new(test_config(2, Duration::ZERO, false), source);

    let (listener, addr) = bind(&server).await;
    let client = TcpStream::connect(addr).await.expect("connect");

    let locators = [memory_locator("data/")];
    let (summary, received) = tokio::join!(
        server.serve(listener, &locators, CancellationToken::new()),
        read_lines(client)
    );
    let summary = summary.expect("run");

    assert_eq!(received, vec!["a\n", "b\n", "c\n", "d\n"]);
    assert_eq!(summary.objects, 1);
    assert_eq!(summary.lines, 4);
    assert_eq!(summary.deliveries, 4);
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.pauses, 1);
    assert!(!summary.interrupted);
}

#[tokio::test]
async fn objects_and_locators_stream_in_listed_order() {
    let mut source = MemorySource::new();
    source
        .insert("bucket", "logs/b", "b1\nb2\n")
        .insert("bucket", "logs/a", "a1\n")
        .insert("bucket", "logs/empty", "")
        .insert("bucket", "more/c", "c1\n")
        .insert("bucket", "skip/x", "x1\n");
    let server = Server::new(test_config(100, Duration::ZERO, false), source);

    let (listener, addr) = bind(&server).await;
    let client = TcpStream::connect(addr).await.expect("connect");

    let locators = [memory_locator("logs/"), memory_locator("more/")];
    let (summary, received) = tokio::join!(
        server.serve(listener, &locators, CancellationToken::new()),
        read_lines(client)
    );
    let summary = summary.expect("run");

    assert_eq!(received, vec!["a1\n", "b1\n", "b2\n", "c1\n"]);
    assert_eq!(summary.objects, 4);
    assert_eq!(summary.lines, 4);
    assert_eq!(summary.pauses, 0);
}

#[tokio::test]
async fn run_without_clients_completes_silently() {
    let mut source = MemorySource::new();
    source.insert("bucket", "k", "one\ntwo\nthree\n");
    let server = Server::new(test_config(0, Duration::ZERO, false), source);

    let summary = server
        .run(&[memory_locator("")], CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(summary.lines, 3);
    assert_eq!(summary.deliveries, 0);
    assert_eq!(summary.accepted, 0);
    assert_eq!(summary.pauses, 3);
}

#[tokio::test]
async fn pause_happens_after_batch_is_exceeded() {
    let mut source = MemorySource::new();
    source.insert("bucket", "k", "1\n2\n3\n");
    let pause = Duration::from_millis(80);
    let server = Server::new(test_config(1, pause, false), source);

    let started = Instant::now();
    let summary = server
        .run(&[memory_locator("")], CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(summary.pauses, 1);
    assert!(started.elapsed() >= pause);
}

#[tokio::test]
async fn timestamped_lines_carry_rfc3339_prefix() {
    let mut source = MemorySource::new();
    source.insert("bucket", "k", "first line\nsecond\tline\n");
    let server = Server::new(test_config(10, Duration::ZERO, true), source);

    let (listener, addr) = bind(&server).await;
    let client = TcpStream::connect(addr).await.expect("connect");

    let locators = [memory_locator("")];
    let (summary, received) = tokio::join!(
        server.serve(listener, &locators, CancellationToken::new()),
        read_lines(client)
    );
    summary.expect("run");

    let shape = Regex::new(r"^\S+\t.*\n$").expect("regex");
    assert_eq!(received.len(), 2);
    for line in &received {
        assert!(shape.is_match(line), "unexpected line shape: {line:?}");
        let (stamp, _) = line.split_once('\t').expect("tab");
        OffsetDateTime::parse(stamp, &Rfc3339).expect("timestamp parses");
    }
    assert!(received[0].ends_with("\tfirst line\n"));
    assert!(received[1].ends_with("\tsecond\tline\n"));
}

#[tokio::test]
async fn closed_client_is_evicted_while_others_keep_receiving() {
    let mut source = MemorySource::new();
    let body: String = (0..10).map(|i| format!("line-{i}\n")).collect();
    source.insert("bucket", "k", body);
    let server = Server::new(test_config(100, Duration::ZERO, false), source);

    let (listener, addr) = bind(&server).await;
    let keeper = TcpStream::connect(addr).await.expect("connect keeper");
    let leaver = TcpStream::connect(addr).await.expect("connect leaver");
    drop(leaver);

    let locators = [memory_locator("")];
    let (summary, received) = tokio::join!(
        server.serve(listener, &locators, CancellationToken::new()),
        read_lines(keeper)
    );
    let summary = summary.expect("run");

    let expected: Vec<String> = (0..10).map(|i| format!("line-{i}\n")).collect();
    assert_eq!(received, expected);
    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.evicted, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn late_client_receives_only_lines_after_it_joined() {
    let mut source = MemorySource::new();
    let body: String = (0..30).map(|i| format!("line-{i:02}\n")).collect();
    source.insert("bucket", "k", body);
    let server = Server::new(test_config(0, Duration::from_millis(10), false), source);

    let (listener, addr) = bind(&server).await;
    let early = TcpStream::connect(addr).await.expect("connect early");
    let mut early = BufReader::new(early);

    let run = tokio::spawn(async move {
        server
            .serve(listener, &[memory_locator("")], CancellationToken::new())
            .await
    });

    let mut first = String::new();
    early.read_line(&mut first).await.expect("first line");
    assert_eq!(first, "line-00\n");

    let late = TcpStream::connect(addr).await.expect("connect late");
    let late_lines = read_lines(late).await;
    let mut early_lines = vec![first];
    early_lines.extend(read_lines(early.into_inner()).await);

    let summary = run.await.expect("join").expect("run");
    assert_eq!(summary.lines, 30);

    let expected: Vec<String> = (0..30).map(|i| format!("line-{i:02}\n")).collect();
    assert_eq!(early_lines, expected);

    assert!(!late_lines.is_empty(), "late client never received a line");
    let start = expected
        .iter()
        .position(|line| *line == late_lines[0])
        .expect("late line comes from source");
    assert!(start >= 1);
    assert_eq!(late_lines, expected[start..].to_vec());
}

#[tokio::test]
async fn source_read_failure_aborts_run_and_releases_sockets() {
    let mut source = MemorySource::new();
    source
        .insert_failing("bucket", "a", "x\ny\n", "connection reset by store")
        .insert("bucket", "b", "never\n");
    let server = Server::new(test_config(100, Duration::ZERO, false), source);

    let (listener, addr) = bind(&server).await;
    let client = TcpStream::connect(addr).await.expect("connect");

    let locators = [memory_locator("")];
    let (result, received) = tokio::join!(
        server.serve(listener, &locators, CancellationToken::new()),
        read_lines(client)
    );

    let err = result.expect_err("read failure is fatal");
    assert!(matches!(err, ServerError::Source(SourceError::Read { .. })));
    assert_eq!(received, vec!["x\n", "y\n"]);
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn missing_bucket_is_fatal() {
    let server = Server::new(test_config(1, Duration::ZERO, false), MemorySource::new());
    let err = server
        .run(&[memory_locator("")], CancellationToken::new())
        .await
        .expect_err("must fail");
    assert!(matches!(
        err,
        ServerError::Source(SourceError::BucketNotFound { .. })
    ));
}

#[tokio::test]
async fn bind_failure_is_reported() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").expect("occupy port");
    let port = occupied.local_addr().expect("addr").port();

    let mut config = test_config(1, Duration::ZERO, false);
    config.bind_port = port;
    let server = Server::new(config, MemorySource::new());

    let err = server
        .run(&[memory_locator("")], CancellationToken::new())
        .await
        .expect_err("bind must fail");
    assert!(matches!(err, ServerError::Bind { .. }));
}

#[tokio::test]
async fn cancelled_before_start_sends_nothing() {
    let mut source = MemorySource::new();
    source.insert("bucket", "k", "a\n");
    let server = Server::new(test_config(1, Duration::ZERO, false), source);

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let summary = server
        .run(&[memory_locator("")], shutdown)
        .await
        .expect("run");

    assert!(summary.interrupted);
    assert_eq!(summary.lines, 0);
}

#[tokio::test]
async fn shutdown_interrupts_pause_promptly() {
    let mut source = MemorySource::new();
    source.insert("bucket", "k", "a\nb\nc\n");
    let server = Server::new(test_config(0, Duration::from_secs(5), false), source);

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let summary = server
        .run(&[memory_locator("")], shutdown)
        .await
        .expect("run");

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(summary.interrupted);
    assert_eq!(summary.lines, 1);
    assert_eq!(summary.pauses, 1);
}
