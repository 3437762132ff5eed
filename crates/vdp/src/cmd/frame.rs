use bytes::BytesMut;
use vdp_frame::{cobs_decode, cobs_encode, validate_packet, PacketHeader, PacketValidity};

use crate::cmd::{parse_hex, FrameArgs, FrameCommand};
use crate::exit::{CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_bytes, print_check, OutputFormat};

pub fn run(args: FrameArgs, format: OutputFormat) -> CliResult<i32> {
    match args.command {
        FrameCommand::Encode {
            hex,
            leading_delimiter,
        } => {
            let payload = parse_hex(&hex)?;
            let frame = encode(&payload, leading_delimiter);
            print_bytes("encode", payload.len(), &frame, format);
            Ok(SUCCESS)
        }
        FrameCommand::Decode { hex } => {
            let frame = parse_hex(&hex)?;
            let payload = decode(&frame);
            print_bytes("decode", frame.len(), &payload, format);
            Ok(SUCCESS)
        }
        FrameCommand::Check { hex } => {
            let packet = parse_hex(&hex)?;
            let validity = validate_packet(&packet);
            let header = (validity == PacketValidity::Ok).then(|| PacketHeader::from_byte(packet[0]));
            print_check(packet.len(), validity, header, format);
            Ok(check_code(validity))
        }
    }
}

fn encode(payload: &[u8], leading_delimiter: bool) -> Vec<u8> {
    let mut frame = BytesMut::new();
    cobs_encode(payload, leading_delimiter, &mut frame);
    frame.to_vec()
}

fn decode(frame: &[u8]) -> Vec<u8> {
    let mut payload = BytesMut::new();
    cobs_decode(frame, &mut payload);
    payload.to_vec()
}

fn check_code(validity: PacketValidity) -> i32 {
    match validity {
        PacketValidity::Ok => SUCCESS,
        PacketValidity::TooSmall | PacketValidity::BadChecksum => DATA_INVALID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_and_decode_helpers() {
        let frame = encode(&[0x11, 0x22, 0x00, 0x33], false);
        assert_eq!(frame, vec![0x03, 0x11, 0x22, 0x02, 0x33, 0x00]);
        assert_eq!(decode(&frame), vec![0x11, 0x22, 0x00, 0x33]);

        let frame = encode(&[], true);
        assert_eq!(frame, vec![0x00, 0x01, 0x00]);
    }

    #[test]
    fn check_codes() {
        assert_eq!(check_code(PacketValidity::Ok), SUCCESS);
        assert_eq!(check_code(PacketValidity::TooSmall), DATA_INVALID);
        assert_eq!(check_code(PacketValidity::BadChecksum), DATA_INVALID);
    }
}
