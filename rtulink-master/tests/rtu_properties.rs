//! Properties of frame decoding over generated frames.

use rand::Rng;
use rtulink_master::rtu::{crc16, decode, encode_read, encode_write_coil, encode_write_register};
use rtulink_master::{ExceptionCode, TransactionResult};

fn with_crc(body: &[u8]) -> Vec<u8> {
    let mut frame = body.to_vec();
    frame.extend_from_slice(&crc16(body).to_le_bytes());
    frame
}

/// A well-formed read response carrying `registers`.
fn read_response(slave_id: u8, registers: &[u16]) -> Vec<u8> {
    let mut body = vec![slave_id, 0x03, (registers.len() * 2) as u8];
    for value in registers {
        body.extend_from_slice(&value.to_be_bytes());
    }
    with_crc(&body)
}

#[test]
fn test_crc_round_trip_on_random_frames() {
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let len = rng.gen_range(1..64);
        let body: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();
        let frame = with_crc(&body);
        let (payload, trailer) = frame.split_at(frame.len() - 2);
        assert_eq!(crc16(payload).to_le_bytes(), trailer);
    }
}

#[test]
fn test_any_single_bit_flip_in_trailer_fails() {
    let request = encode_read(1, 0, 4);
    let response = read_response(1, &[500, 42, 1, 0]);
    assert!(decode(&request, &response).is_ok());

    let trailer_start = response.len() - 2;
    for byte in trailer_start..response.len() {
        for bit in 0..8 {
            let mut corrupted = response.clone();
            corrupted[byte] ^= 1 << bit;
            assert_eq!(
                decode(&request, &corrupted),
                TransactionResult::CrcError,
                "flip of bit {} in byte {} went undetected",
                bit,
                byte
            );
        }
    }
}

#[test]
fn test_any_single_bit_flip_in_body_fails() {
    let request = encode_read(1, 0, 4);
    let response = read_response(1, &[500, 42, 1, 0]);

    for byte in 0..response.len() - 2 {
        for bit in 0..8 {
            let mut corrupted = response.clone();
            corrupted[byte] ^= 1 << bit;
            assert_eq!(decode(&request, &corrupted), TransactionResult::CrcError);
        }
    }
}

#[test]
fn test_byte_count_yields_half_as_many_registers() {
    let mut rng = rand::thread_rng();
    let request = encode_read(7, 0, 4);

    for count in 0..=125usize {
        let registers: Vec<u16> = (0..count).map(|_| rng.r#gen()).collect();
        let response = read_response(7, &registers);
        assert_eq!(response[2] as usize, count * 2);
        assert_eq!(decode(&request, &response), TransactionResult::Ok(registers));
    }
}

#[test]
fn test_byte_count_disagreement_is_malformed() {
    let request = encode_read(1, 0, 4);
    let registers = [500u16, 42, 1, 0];

    for declared in [0u8, 2, 6, 7, 10, 255] {
        let mut body = vec![0x01, 0x03, declared];
        for value in registers {
            body.extend_from_slice(&value.to_be_bytes());
        }
        assert_eq!(
            decode(&request, &with_crc(&body)),
            TransactionResult::MalformedFrame,
            "declared {} for 8 data bytes",
            declared
        );
    }
}

#[test]
fn test_crc_checked_before_exception() {
    let request = encode_read(1, 0, 4);
    let exception = with_crc(&[0x01, 0x83, 0x02]);
    assert_eq!(exception, [0x01, 0x83, 0x02, 0xC0, 0xF1]);

    // Valid CRC: the exception is reported.
    assert_eq!(
        decode(&request, &exception),
        TransactionResult::SlaveException(ExceptionCode::IllegalDataAddress)
    );

    // Same frame with a broken trailer: a CRC error, never an exception.
    let mut corrupted = exception.clone();
    corrupted[4] ^= 0x01;
    assert_eq!(decode(&request, &corrupted), TransactionResult::CrcError);
}

#[test]
fn test_exception_must_match_request_function() {
    // An exception for 0x05 in answer to a read is not this request's exception.
    let request = encode_read(1, 0, 4);
    let foreign = with_crc(&[0x01, 0x85, 0x02]);
    assert_eq!(decode(&request, &foreign), TransactionResult::MalformedFrame);

    let coil = encode_write_coil(1, 0, true);
    assert_eq!(
        decode(&coil, &foreign),
        TransactionResult::SlaveException(ExceptionCode::IllegalDataAddress)
    );
}

#[test]
fn test_write_echo_decodes_for_every_value() {
    let mut rng = rand::thread_rng();
    for _ in 0..50 {
        let address: u16 = rng.r#gen();
        let value: u16 = rng.r#gen();
        let request = encode_write_register(1, address, value);
        // The slave echoes the request verbatim.
        assert_eq!(
            decode(&request, request.as_bytes()),
            TransactionResult::Ok(vec![address, value])
        );
    }
}
