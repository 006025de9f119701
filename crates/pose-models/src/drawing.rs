//! Skeleton overlay rendering
//!
//! Draws COCO-17 keypoints and their connecting bones onto a frame in place.
//! Coordinates arrive normalized (0-1) and are scaled to the frame size.

use image::Rgb;
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use pose_playback_common::Frame;

use crate::{Keypoint, KEYPOINTS_PER_PERSON};

/// Bone connections between COCO keypoint indices
pub const SKELETON: &[(usize, usize)] = &[
    // Head
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    // Torso
    (5, 6),
    (5, 11),
    (6, 12),
    (11, 12),
    // Arms
    (5, 7),
    (7, 9),
    (6, 8),
    (8, 10),
    // Legs
    (11, 13),
    (13, 15),
    (12, 14),
    (14, 16),
];

const BONE_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const JOINT_COLOR: Rgb<u8> = Rgb([0, 64, 255]);

/// Draw skeletons for every detected person onto the frame.
///
/// `keypoints` holds 17 entries per person; keypoints (and bones touching
/// them) below `threshold` are skipped. Frames that are not RGB are left
/// untouched.
pub fn draw_skeleton(frame: &mut Frame, keypoints: &[Keypoint], threshold: f32) {
    if keypoints.is_empty() {
        return;
    }

    let width = frame.width as f32;
    let height = frame.height as f32;
    let radius = ((frame.height / 240).max(2)) as i32;

    frame.edit_rgb(|img| {
        for person in keypoints.chunks_exact(KEYPOINTS_PER_PERSON) {
            for &(a, b) in SKELETON {
                let (kp_a, kp_b) = (&person[a], &person[b]);
                if kp_a.confidence < threshold || kp_b.confidence < threshold {
                    continue;
                }
                draw_line_segment_mut(
                    img,
                    (kp_a.x * width, kp_a.y * height),
                    (kp_b.x * width, kp_b.y * height),
                    BONE_COLOR,
                );
            }

            for kp in person {
                if kp.confidence < threshold {
                    continue;
                }
                draw_filled_circle_mut(
                    img,
                    ((kp.x * width) as i32, (kp.y * height) as i32),
                    radius,
                    JOINT_COLOR,
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeypointName;
    use pose_playback_common::PixelFormat;

    fn rgb_frame(width: u32, height: u32) -> Frame {
        Frame {
            index: 0,
            timestamp: 0.0,
            width,
            height,
            format: PixelFormat::Rgb24,
            data: vec![0u8; (width * height * 3) as usize],
        }
    }

    fn full_person(confidence: f32) -> Vec<Keypoint> {
        (0..KEYPOINTS_PER_PERSON)
            .map(|i| {
                let name = KeypointName::from_index(i).unwrap();
                let t = i as f32 / KEYPOINTS_PER_PERSON as f32;
                Keypoint::new(name, 0.2 + 0.6 * t, 0.2 + 0.6 * t, confidence)
            })
            .collect()
    }

    #[test]
    fn test_draw_changes_pixels() {
        let mut frame = rgb_frame(64, 64);
        draw_skeleton(&mut frame, &full_person(0.9), 0.5);
        assert!(frame.data.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_empty_keypoints_leave_frame_unchanged() {
        let mut frame = rgb_frame(64, 64);
        let before = frame.data.clone();
        draw_skeleton(&mut frame, &[], 0.5);
        assert_eq!(frame.data, before);
    }

    #[test]
    fn test_below_threshold_keypoints_skipped() {
        let mut frame = rgb_frame(64, 64);
        let before = frame.data.clone();
        draw_skeleton(&mut frame, &full_person(0.1), 0.5);
        assert_eq!(frame.data, before);
    }

    #[test]
    fn test_two_people_both_drawn() {
        let mut frame = rgb_frame(64, 64);
        let mut keypoints = full_person(0.9);
        keypoints.extend(full_person(0.9).into_iter().map(|mut kp| {
            kp.x = 1.0 - kp.x;
            kp
        }));
        draw_skeleton(&mut frame, &keypoints, 0.5);
        assert!(frame.data.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_skeleton_indices_in_range() {
        for &(a, b) in SKELETON {
            assert!(a < KEYPOINTS_PER_PERSON);
            assert!(b < KEYPOINTS_PER_PERSON);
        }
    }
}
