//! Text wire format for landmark sets: `"x1,y1|x2,y2|...|x68,y68"`.
//!
//! Every coordinate carries exactly two decimals. There is no length prefix,
//! checksum, or trailing delimiter; the peripheral splits on `|` then `,`.

use std::fmt::Write;

use thiserror::Error;

use crate::detection::domain::face_landmarks::{LandmarkPoint, LandmarkSet};
use crate::shared::constants::LANDMARK_COUNT;

const POINT_SEPARATOR: char = '|';
const COORD_SEPARATOR: char = ',';

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8")]
    Utf8,
    #[error("point {index} is malformed: {segment:?}")]
    MalformedPoint { index: usize, segment: String },
    #[error("expected 68 points, got {0}")]
    PointCount(usize),
}

/// Encode a landmark set as the UTF-8 payload written to the peripheral.
pub fn encode(landmarks: &LandmarkSet) -> String {
    // "-1234.56,-1234.56|" is the widest realistic point
    let mut out = String::with_capacity(LANDMARK_COUNT * 18);
    for (i, p) in landmarks.iter().enumerate() {
        if i > 0 {
            out.push(POINT_SEPARATOR);
        }
        push_fixed2(&mut out, p.x);
        out.push(COORD_SEPARATOR);
        push_fixed2(&mut out, p.y);
    }
    out
}

/// Two-decimal rendering that rounds exact ties away from zero, matching
/// JavaScript's `toFixed(2)`. `{:.2}` alone rounds them half-to-even.
fn push_fixed2(out: &mut String, v: f64) {
    // -0.0 prints as "0.00"
    let v = if v == 0.0 { 0.0 } else { v };
    let eighths = v.abs() * 8.0;
    // Only odd multiples of 1/8 sit exactly halfway between two hundredths
    let is_tie = eighths.fract() == 0.0 && eighths < 1e15 && eighths as u64 % 2 == 1;
    if is_tie {
        let hundredths = (v.abs() * 100.0).ceil() as u64;
        let sign = if v < 0.0 { "-" } else { "" };
        let _ = write!(out, "{sign}{}.{:02}", hundredths / 100, hundredths % 100);
    } else {
        let _ = write!(out, "{v:.2}");
    }
}

/// Inverse of [`encode`], accurate to the two-decimal rounding.
pub fn decode(payload: &[u8]) -> Result<LandmarkSet, DecodeError> {
    let text = std::str::from_utf8(payload).map_err(|_| DecodeError::Utf8)?;
    let points = text
        .split(POINT_SEPARATOR)
        .enumerate()
        .map(|(index, segment)| parse_point(index, segment))
        .collect::<Result<Vec<_>, _>>()?;

    let count = points.len();
    LandmarkSet::from_slice(&points).ok_or(DecodeError::PointCount(count))
}

fn parse_point(index: usize, segment: &str) -> Result<LandmarkPoint, DecodeError> {
    let malformed = || DecodeError::MalformedPoint {
        index,
        segment: segment.to_string(),
    };
    let (x, y) = segment.split_once(COORD_SEPARATOR).ok_or_else(malformed)?;
    let x = x.parse::<f64>().map_err(|_| malformed())?;
    let y = y.parse::<f64>().map_err(|_| malformed())?;
    Ok(LandmarkPoint::new(x, y))
}
