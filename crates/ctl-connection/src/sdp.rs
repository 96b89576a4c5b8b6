//! ---
//! ctl_section: "03-connection-emulator"
//! ctl_subsection: "module"
//! ctl_type: "source"
//! ctl_scope: "code"
//! ctl_description: "Session description manifests served by the mock node."
//! ctl_version: "v0.0.0-prealpha"
//! ctl_owner: "tbd"
//! ---
use std::fmt::Write;

/// Stream flavours the mock node can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Video,
    Audio,
    Data,
    Mux,
}

impl StreamType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "video" => Some(StreamType::Video),
            "audio" => Some(StreamType::Audio),
            "data" => Some(StreamType::Data),
            "mux" => Some(StreamType::Mux),
            _ => None,
        }
    }

    /// Infer the stream type from a manifest URL such as `http://host/audio.sdp`.
    pub fn from_manifest_href(href: &str) -> Option<Self> {
        let file = href.rsplit('/').next()?;
        Self::from_name(file.strip_suffix(".sdp")?)
    }

    fn media_lines(&self) -> &'static str {
        match self {
            StreamType::Video => {
                "m=video 5004 RTP/AVP 96\r\na=rtpmap:96 raw/90000\r\n\
                 a=fmtp:96 sampling=YCbCr-4:2:2; width=1920; height=1080; exactframerate=25; depth=10; TCS=SDR; colorimetry=BT709; PM=2110GPM; SSN=ST2110-20:2017\r\n"
            }
            StreamType::Audio => {
                "m=audio 5004 RTP/AVP 97\r\na=rtpmap:97 L24/48000/2\r\na=ptime:1\r\n"
            }
            StreamType::Data => "m=video 5004 RTP/AVP 100\r\na=rtpmap:100 smpte291/90000\r\n",
            StreamType::Mux => "m=video 5004 RTP/AVP 98\r\na=rtpmap:98 SMPTE2022-6/27000000\r\n",
        }
    }
}

/// Render a manifest for a stream sent from `source_ip` to `multicast_ip`.
pub fn render(stream: StreamType, session_id: &str, source_ip: &str, multicast_ip: &str) -> String {
    let mut sdp = String::new();
    let _ = write!(
        sdp,
        "v=0\r\no=- {session_id} 0 IN IP4 {source_ip}\r\ns=Mock Sender\r\nt=0 0\r\n"
    );
    sdp.push_str(stream.media_lines());
    let _ = write!(
        sdp,
        "c=IN IP4 {multicast_ip}/32\r\na=source-filter: incl IN IP4 {multicast_ip} {source_ip}\r\na=ts-refclk:localmac=CA-FE-01-CA-FE-02\r\na=mediaclk:direct=0\r\n"
    );
    sdp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_type_from_manifest_href() {
        assert_eq!(
            StreamType::from_manifest_href("http://10.0.0.1:5201/audio.sdp"),
            Some(StreamType::Audio)
        );
        assert_eq!(StreamType::from_manifest_href("http://10.0.0.1/x.txt"), None);
    }

    #[test]
    fn render_embeds_addresses() {
        let sdp = render(StreamType::Video, "1234", "10.0.0.1", "239.3.14.1");
        assert!(sdp.starts_with("v=0\r\n"));
        assert!(sdp.contains("m=video 5004 RTP/AVP 96"));
        assert!(sdp.contains("c=IN IP4 239.3.14.1/32"));
        assert!(sdp.contains("incl IN IP4 239.3.14.1 10.0.0.1"));
    }
}
