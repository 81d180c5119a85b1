//! Box drawing on BGR frame copies.

use face_detect::FaceBox;
use video_ingest::Frame;

const BOX_COLOR_BGR: [u8; 3] = [0, 255, 0];
const BOX_THICKNESS: i32 = 2;

/// Return a copy of `frame` with a rectangle stroked around every detected
/// face. The input frame is never touched.
pub(crate) fn draw_face_boxes(frame: &Frame, boxes: &[FaceBox]) -> Frame {
    let mut annotated = Frame {
        data: frame.data.clone(),
        width: frame.width,
        height: frame.height,
        timestamp_ms: frame.timestamp_ms,
        format: frame.format,
    };
    for face in boxes {
        draw_rectangle(&mut annotated.data, frame.width, frame.height, face);
    }
    annotated
}

fn draw_rectangle(data: &mut [u8], width: i32, height: i32, face: &FaceBox) {
    for inset in 0..BOX_THICKNESS {
        stroke_rect(
            data,
            width,
            height,
            face.x + inset,
            face.y + inset,
            face.x + face.width - inset,
            face.y + face.height - inset,
        );
    }
}

fn stroke_rect(data: &mut [u8], width: i32, height: i32, left: i32, top: i32, right: i32, bottom: i32) {
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for x in left..=right {
        put_pixel(data, width, x, top);
        put_pixel(data, width, x, bottom);
    }
    for y in top..=bottom {
        put_pixel(data, width, left, y);
        put_pixel(data, width, right, y);
    }
}

fn put_pixel(data: &mut [u8], width: i32, x: i32, y: i32) {
    let idx = ((y * width + x) * 3) as usize;
    if idx + 3 <= data.len() {
        data[idx..idx + 3].copy_from_slice(&BOX_COLOR_BGR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use video_ingest::FrameFormat;

    fn gray_frame(width: i32, height: i32) -> Frame {
        Frame {
            data: vec![128; (width * height * 3) as usize],
            width,
            height,
            timestamp_ms: 0,
            format: FrameFormat::Bgr8,
        }
    }

    fn pixel(frame: &Frame, x: i32, y: i32) -> [u8; 3] {
        let idx = ((y * frame.width + x) * 3) as usize;
        [frame.data[idx], frame.data[idx + 1], frame.data[idx + 2]]
    }

    #[test]
    fn input_frame_is_left_untouched() {
        let frame = gray_frame(16, 16);
        let boxes = [FaceBox {
            x: 2,
            y: 2,
            width: 10,
            height: 10,
        }];
        let _ = draw_face_boxes(&frame, &boxes);
        assert!(frame.data.iter().all(|&b| b == 128));
    }

    #[test]
    fn box_edges_are_stroked_green() {
        let frame = gray_frame(16, 16);
        let boxes = [FaceBox {
            x: 2,
            y: 2,
            width: 10,
            height: 10,
        }];
        let annotated = draw_face_boxes(&frame, &boxes);
        assert_eq!(pixel(&annotated, 2, 2), BOX_COLOR_BGR);
        assert_eq!(pixel(&annotated, 12, 12), BOX_COLOR_BGR);
        // Interior stays untouched.
        assert_eq!(pixel(&annotated, 7, 7), [128, 128, 128]);
    }

    #[test]
    fn out_of_range_boxes_are_clamped() {
        let frame = gray_frame(8, 8);
        let boxes = [FaceBox {
            x: -5,
            y: -5,
            width: 100,
            height: 100,
        }];
        // Must not panic; edges land on the frame border.
        let annotated = draw_face_boxes(&frame, &boxes);
        assert_eq!(pixel(&annotated, 0, 0), BOX_COLOR_BGR);
        assert_eq!(pixel(&annotated, 7, 7), BOX_COLOR_BGR);
    }
}
