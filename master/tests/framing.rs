use rand::{Rng, seq::IndexedRandom};

use motorbus::{
    command::{Channel, Command, Trailer},
    codec::{Decoder, Frame, Packet, HEADER},
    };


/// commands a board sends with a value
const COMMANDS: [Command; 8] = [
    Command::ActualTick,
    Command::Error,
    Command::FirmwareVersion,
    Command::TwoTargetTickTwoActual,
    Command::TwoTargetTickMotorCurrent,
    Command::ExtraPinValue,
    Command::EmptyResponse,
    Command::PosDownscale,
    ];

fn random_packet(rng: &mut impl Rng) -> (Trailer, Vec<u8>) {
    let command = *COMMANDS.choose(rng).unwrap();
    // sentinel bytes are frequent on purpose
    let payload = (0 .. command.size().bytes())
        .map(|_| *[0x55, 0xAA, 0x54, 0xAB, rng.random::<u8>()].choose(&mut *rng).unwrap())
        .collect();
    let channel = if rng.random() {Channel::B} else {Channel::A};
    let trailer = Trailer::new(command.id(), rng.random(), rng.random_range(0 .. 126), channel);
    (trailer, payload)
}

#[test]
fn random_stream() {
    let mut rng = rand::rng();
    let mut sent = Vec::new();
    let mut wire = Vec::new();
    for _ in 0 .. 2000 {
        let (trailer, payload) = random_packet(&mut rng);
        let frame = Frame::encode(&payload, trailer).unwrap();
        wire.resize(wire.len() + rng.random_range(0 .. 20), 0);
        wire.extend_from_slice(frame.as_bytes());
        sent.push((trailer, payload));
    }

    let mut decoder = Decoder::new();
    let received: Vec<Packet> = wire.iter().filter_map(|&byte| decoder.push(byte)).collect();
    assert_eq!(decoder.bad_checksums(), 0);
    assert_eq!(received.len(), sent.len());
    for (packet, (trailer, payload)) in received.iter().zip(&sent) {
        assert_eq!(packet.trailer, *trailer);
        assert_eq!(packet.payload.as_slice(), payload.as_slice());
    }
}

#[test]
fn survives_corruption() {
    let mut rng = rand::rng();
    let mut decoder = Decoder::new();
    let mut received = 0;
    for _ in 0 .. 500 {
        let (trailer, payload) = random_packet(&mut rng);
        let frame = Frame::encode(&payload, trailer).unwrap();
        let mut bytes = frame.as_bytes().to_vec();
        // garbage never containing a header, that the next header discards
        let garbage: Vec<u8> = (0 .. rng.random_range(0 .. 30))
            .map(|_| rng.random::<u8>())
            .filter(|&byte| byte != HEADER)
            .collect();
        for byte in garbage.into_iter().chain([HEADER]) {
            decoder.push(byte);
        }
        let last = bytes.len() - 1;
        if rng.random_bool(0.2) {
            // break the frame anywhere but on its header
            let index = rng.random_range(0 .. last);
            bytes[index] = bytes[index].wrapping_add(1 + rng.random_range(0 .. 254));
            if bytes[index] == HEADER
                {bytes[index] = 0}
            // nothing invalid may pass through, whatever is decoded must be a well formed packet
            if let Some(packet) = bytes.iter().filter_map(|&byte| decoder.push(byte)).last() {
                assert!(packet.command().is_none_or(|command| packet.payload.len() == command.size().bytes()));
            }
        }
        else {
            let packet = bytes.iter().filter_map(|&byte| decoder.push(byte)).last().unwrap();
            assert_eq!(packet.trailer, trailer);
            assert_eq!(packet.payload.as_slice(), payload.as_slice());
            received += 1;
        }
    }
    assert!(received > 0);
}
