use std::{
    io::Read,
    net::{TcpListener, TcpStream},
    thread,
    time::Duration,
};

/// Minimal raw collector standing in for a slow/fast child: reads
/// length-prefixed frames (4-byte LE length + payload) off a plain
/// `TcpStream`, optionally delaying its first read to simulate a slow
/// consumer.
fn spawn_frame_collector(read_delay: Duration) -> (u16, thread::JoinHandle<Vec<Vec<u8>>>) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        if !read_delay.is_zero() {
            thread::sleep(read_delay);
        }

        let mut frames = Vec::new();
        loop {
            let mut len_buf = [0u8; 4];
            if stream.read_exact(&mut len_buf).is_err() {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            let mut payload = vec![0u8; len];
            if stream.read_exact(&mut payload).is_err() {
                break;
            }
            frames.push(payload);
        }
        frames
    });

    (port, handle)
}

fn send_frame(stream: &mut TcpStream, payload: &[u8]) {
    use std::io::Write;
    stream.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
    stream.write_all(payload).unwrap();
}

/// Two independent child connections, each driven by its own thread (as
/// the root router's per-child send threads are): a slow reader on one
/// connection must never stall delivery on the other, and the slow
/// reader must still eventually get its full backlog once it starts
/// reading.
#[test]
fn independent_child_connections_dont_block_each_other() {
    let (slow_port, slow_handle) = spawn_frame_collector(Duration::from_millis(500));
    let (fast_port, fast_handle) = spawn_frame_collector(Duration::from_millis(0));

    let big = vec![7u8; 4 * 1024 * 1024];
    let marker = b"marker-after-backpressure".to_vec();
    let keepalive = b"fast-keepalive".to_vec();

    let slow_sender = {
        let big = big.clone();
        let marker = marker.clone();
        thread::spawn(move || {
            let mut stream = TcpStream::connect(("127.0.0.1", slow_port)).unwrap();
            send_frame(&mut stream, &big);
            send_frame(&mut stream, &marker);
        })
    };

    let fast_sender = {
        let keepalive = keepalive.clone();
        thread::spawn(move || {
            let mut stream = TcpStream::connect(("127.0.0.1", fast_port)).unwrap();
            send_frame(&mut stream, &keepalive);
        })
    };

    fast_sender.join().unwrap();
    let fast_frames = fast_handle.join().unwrap();
    assert_eq!(fast_frames, vec![keepalive], "fast child should not wait on the slow one");

    slow_sender.join().unwrap();
    let slow_frames = slow_handle.join().unwrap();
    assert_eq!(slow_frames, vec![big, marker]);
}
