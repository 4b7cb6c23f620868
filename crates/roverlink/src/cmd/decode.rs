use bytes::BytesMut;
use roverlink_frame::{decode_frame, FrameConfig, FrameError};
use tracing::warn;

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{payload_preview, print_records, FrameRecord, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let data = std::fs::read(&args.path)
        .map_err(|err| io_error(&format!("read {}", args.path.display()), err))?;
    let (records, trailing) = decode_capture(&data)?;
    print_records(&records, trailing, format);

    let failures = records.iter().filter(|r| r.error.is_some()).count();
    if failures > 0 || trailing > 0 {
        warn!(failures, trailing, "capture has invalid frames");
        return Ok(DATA_INVALID);
    }
    Ok(SUCCESS)
}

/// Decode every frame in `data`. Returns the records and the number of
/// trailing bytes that do not form a complete frame.
fn decode_capture(data: &[u8]) -> CliResult<(Vec<FrameRecord>, usize)> {
    let config = FrameConfig::default();
    let mut buf = BytesMut::from(data);
    let mut records = Vec::new();

    loop {
        let offset = data.len() - buf.len();
        match decode_frame(&mut buf, &config) {
            Ok(Some(frame)) => records.push(FrameRecord {
                offset,
                id: Some(frame.id),
                purpose: Some(frame.purpose.name().to_string()),
                sequence: Some(frame.sequence),
                payload_size: frame.payload.len(),
                payload: payload_preview(&frame.payload),
                error: None,
                raw: frame.payload.to_vec(),
            }),
            Ok(None) => break,
            Err(err @ FrameError::ChecksumMismatch { id, purpose, .. }) => {
                records.push(FrameRecord {
                    offset,
                    id: Some(id),
                    purpose: Some(purpose.name().to_string()),
                    sequence: None,
                    payload_size: 0,
                    payload: String::new(),
                    error: Some(err.to_string()),
                    raw: Vec::new(),
                });
            }
            Err(err @ FrameError::UnknownPurpose(_)) => {
                records.push(failure(offset, &err));
            }
            // The size field cannot be trusted, so nothing after it can be framed.
            Err(err @ FrameError::PayloadTooLarge { .. }) => {
                records.push(failure(offset, &err));
                return Ok((records, 0));
            }
            Err(err) => return Err(frame_error("decode", err)),
        }
    }
    Ok((records, buf.len()))
}

fn failure(offset: usize, err: &FrameError) -> FrameRecord {
    FrameRecord {
        offset,
        id: None,
        purpose: None,
        sequence: None,
        payload_size: 0,
        payload: String::new(),
        error: Some(err.to_string()),
        raw: Vec::new(),
    }
}
