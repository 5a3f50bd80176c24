//! Annotation rendering: a hollow box around each face and a filled label
//! strip naming the match (or "Unknown") beneath it.

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use lineup_core::{MatchResult, Recognition};

use crate::config::Config;

const LABEL_STRIP_HEIGHT: u32 = 16;
const LABEL_TEXT_SCALE: f32 = 13.0;

pub struct Renderer {
    box_color: Rgb<u8>,
    text_color: Rgb<u8>,
    font: Option<FontVec>,
}

impl Renderer {
    /// Build a renderer from the configured colors and font. A missing or
    /// unparseable font degrades to boxes and label strips without text.
    pub fn new(config: &Config) -> Self {
        let font = match std::fs::read(&config.font_path) {
            Ok(bytes) => match FontVec::try_from_vec(bytes) {
                Ok(font) => Some(font),
                Err(err) => {
                    tracing::warn!(
                        path = %config.font_path.display(),
                        error = %err,
                        "font file is not a usable TTF; labels will be drawn without text"
                    );
                    None
                }
            },
            Err(err) => {
                tracing::warn!(
                    path = %config.font_path.display(),
                    error = %err,
                    "label font unavailable; labels will be drawn without text"
                );
                None
            }
        };

        Self {
            box_color: Rgb(config.box_color.0),
            text_color: Rgb(config.text_color.0),
            font,
        }
    }

    /// Draw every match onto a copy of the photo.
    pub fn annotate(&self, recognition: &Recognition) -> RgbImage {
        let mut canvas = recognition.image.clone();
        for result in &recognition.matches {
            self.draw_match(&mut canvas, result);
        }
        canvas
    }

    fn draw_match(&self, canvas: &mut RgbImage, result: &MatchResult) {
        let loc = result.location;
        let width = (loc.right - loc.left).max(1) as u32;
        let height = (loc.bottom - loc.top).max(1) as u32;

        draw_hollow_rect_mut(
            canvas,
            Rect::at(loc.left, loc.top).of_size(width, height),
            self.box_color,
        );
        draw_filled_rect_mut(
            canvas,
            Rect::at(loc.left, loc.bottom).of_size(width, LABEL_STRIP_HEIGHT),
            self.box_color,
        );

        if let Some(font) = &self.font {
            draw_text_mut(
                canvas,
                self.text_color,
                loc.left + 2,
                loc.bottom + 1,
                PxScale::from(LABEL_TEXT_SCALE),
                font,
                result.display_label(),
            );
        }
    }
}
