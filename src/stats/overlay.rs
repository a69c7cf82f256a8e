//! Stats Overlay Text
//!
//! Plain-text version of the on-screen stats panel.

use std::fmt::Write;

use super::StatsSnapshot;

/// Formats [`StatsSnapshot`]s into the overlay text.
///
/// Output is one line per item, always in the same order:
///
/// ```text
/// Video stream: 1920x1080 60.00 FPS (Codec: H264)
/// Incoming frame rate from network: 59.80 FPS
/// Rendering frame rate: 59.10 FPS
/// Frames: 1200 received, 1186 presented, 14 dropped
/// Frames dropped: 1.17%
/// Bitrate: 18.5 Mbps (average 17.9 Mbps)
/// Network latency: 14 ms (variance: 2 ms)
/// Decoding time: 3.20 ms
/// Packet loss: 0.00%
/// ```
///
/// Latency, decoding time and packet loss show the latest sample the
/// connection reported, not an average over the session.
///
/// Any rate whose denominator is zero is printed as zero.
pub struct StatsAggregator;

impl StatsAggregator {
    pub fn format(snapshot: &StatsSnapshot) -> String {
        let secs = snapshot.elapsed.as_secs_f64();
        let rx_fps = ratio(snapshot.frames_received as f64, secs);
        let present_fps = ratio(snapshot.frames_presented as f64, secs);
        let drop_pct = ratio(snapshot.frames_dropped as f64, snapshot.frames_received as f64) * 100.0;
        let avg_mbps = ratio(snapshot.bytes_received as f64 * 8.0, secs * 1_000_000.0);
        let current_mbps = snapshot.bitrate_kbps.map(|k| k as f64 / 1000.0).unwrap_or(avg_mbps);

        let stream = &snapshot.stream;
        let mut text = String::with_capacity(384);

        // Writing into a String cannot fail
        let _ = writeln!(
            text,
            "Video stream: {}x{} {:.2} FPS (Codec: {})",
            stream.width,
            stream.height,
            stream.fps as f64,
            stream.codec.as_str()
        );
        let _ = writeln!(text, "Incoming frame rate from network: {:.2} FPS", rx_fps);
        let _ = writeln!(text, "Rendering frame rate: {:.2} FPS", present_fps);
        let _ = writeln!(
            text,
            "Frames: {} received, {} presented, {} dropped",
            snapshot.frames_received, snapshot.frames_presented, snapshot.frames_dropped
        );
        let _ = writeln!(text, "Frames dropped: {:.2}%", drop_pct);
        let _ = writeln!(text, "Bitrate: {:.1} Mbps (average {:.1} Mbps)", current_mbps, avg_mbps);

        match snapshot.rtt_ms {
            Some(rtt) => {
                let _ = writeln!(
                    text,
                    "Network latency: {} ms (variance: {} ms)",
                    rtt,
                    snapshot.rtt_variance_ms.unwrap_or(0)
                );
            }
            None => text.push_str("Network latency: N/A\n"),
        }

        match snapshot.decode_time_ms {
            Some(decode) => {
                let _ = writeln!(text, "Decoding time: {:.2} ms", decode);
            }
            None => text.push_str("Decoding time: N/A\n"),
        }

        let _ = write!(text, "Packet loss: {:.2}%", snapshot.packet_loss.unwrap_or(0.0));

        text
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
