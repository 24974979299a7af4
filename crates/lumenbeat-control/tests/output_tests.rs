use lumenbeat_control::dmx::{ArtDmxPacket, ArtNetSender, DmxUniverse, UNIVERSE_SIZE};
use lumenbeat_control::{ControlError, FrameSink, Result, ShowOutput};
use lumenbeat_core::board::{
    Arrangement, ArrangementChoice, Board, BoardSettings, FixtureSpec, Palette, Rgb, Theme,
    ThemeSet,
};
use lumenbeat_core::{SharedBoard, ShowEvents};
use proptest::prelude::*;
use std::net::UdpSocket;
use std::time::Duration;

/// Records frames, optionally failing the first `fail_first` sends
#[derive(Default)]
struct Recorder {
    frames: Vec<DmxUniverse>,
    fail_first: usize,
    calls: usize,
}

impl FrameSink for Recorder {
    fn send_frame(&mut self, universe: &DmxUniverse) -> Result<bool> {
        self.calls += 1;
        if self.calls <= self.fail_first {
            return Err(ControlError::DmxError("link down".into()));
        }
        self.frames.push(universe.clone());
        Ok(true)
    }
}

fn shared_board() -> SharedBoard {
    let mut palette = Palette::new();
    palette.insert("red".into(), Rgb::new(255, 0, 0));
    palette.insert("blue".into(), Rgb::new(0, 0, 255));
    palette.insert("white".into(), Rgb::new(255, 255, 255));

    let mut themes = ThemeSet::new();
    themes.insert(
        "duo".into(),
        Theme {
            sequence: vec!["red".into(), "blue".into()],
            kick: vec!["white".into()],
        },
    );

    let settings = BoardSettings {
        kick_duration_secs: 0.2,
        color_duration_secs: 1.0,
        fade_duration_secs: 0.5,
        initial_theme: Some("duo".into()),
        initial_arrangement: ArrangementChoice::Fixed(Arrangement::AllSame),
        ..Default::default()
    };
    let fixtures = vec![
        FixtureSpec::rgb("left", 0, true),
        FixtureSpec::rgb("right", 3, false),
    ];
    SharedBoard::new(Board::new(fixtures, palette, themes, settings, 0.0).unwrap())
}

#[test]
fn test_tick_renders_current_colors() {
    let mut output = ShowOutput::new(shared_board(), Recorder::default());

    assert!(output.tick(0.0));
    assert!(output.tick(1.0));
    assert_eq!(output.frames_sent(), 2);

    let frames = &output.sink().frames;
    assert_eq!(&frames[0].channels()[0..6], &[255, 0, 0, 255, 0, 0]);
    assert_eq!(&frames[1].channels()[0..6], &[0, 0, 255, 0, 0, 255]);
}

#[test]
fn test_kick_shows_on_next_frame() {
    let board = shared_board();
    let mut output = ShowOutput::new(board.clone(), Recorder::default());

    board.on_kick(0.1);
    output.tick(0.1);
    let frame = output.sink().frames.last().unwrap();
    assert_eq!(&frame.channels()[0..3], &[255, 255, 255]);
    assert_eq!(&frame.channels()[3..6], &[255, 0, 0]);

    output.tick(0.35);
    let frame = output.sink().frames.last().unwrap();
    assert_eq!(&frame.channels()[0..3], &[255, 0, 0]);
}

#[test]
fn test_send_errors_are_swallowed() {
    let sink = Recorder {
        fail_first: 3,
        ..Default::default()
    };
    let mut output = ShowOutput::new(shared_board(), sink);

    for i in 0..5 {
        let sent = output.tick(i as f64 * 0.01);
        assert_eq!(sent, i >= 3);
    }
    assert_eq!(output.send_errors(), 3);
    assert_eq!(output.frames_sent(), 2);
}

#[test]
fn test_artnet_output_end_to_end() {
    let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
    receiver
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let target = receiver.local_addr().unwrap().to_string();

    let sender = ArtNetSender::new(1, &target).unwrap();
    let mut output = ShowOutput::new(shared_board(), sender);
    assert!(output.tick(0.0));

    let mut buf = [0u8; 600];
    let (len, _) = receiver.recv_from(&mut buf).unwrap();
    let packet = ArtDmxPacket::decode(&buf[..len]).unwrap();
    assert_eq!(packet.universe, 1);
    assert_eq!(packet.length as usize, UNIVERSE_SIZE);
    assert_eq!(&packet.data[0..6], &[255, 0, 0, 255, 0, 0]);
}

proptest! {
    #[test]
    fn prop_universe_survives_artnet(
        data in prop::collection::vec(any::<u8>(), UNIVERSE_SIZE),
        universe_id in 0u16..0x8000,
        sequence in any::<u8>(),
    ) {
        let mut channels = [0u8; UNIVERSE_SIZE];
        channels.copy_from_slice(&data);
        let universe = DmxUniverse::from_channels(channels);

        let bytes = ArtDmxPacket::encode(universe_id, sequence, &universe);
        prop_assert_eq!(bytes.len(), 530);

        let packet = ArtDmxPacket::decode(&bytes).unwrap();
        prop_assert_eq!(packet.universe, universe_id);
        prop_assert_eq!(packet.sequence, sequence);
        prop_assert_eq!(packet.to_universe(), universe);
    }
}
