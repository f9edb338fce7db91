use image::Rgba;
use pdf_engine::RgbaImage;
use std::ops::Range;
use viewer_core::OverlayElement;

const HIGHLIGHT_COLOR: [u8; 3] = [255, 235, 59];
const HIGHLIGHT_ALPHA: f32 = 0.4;
const MARKER_COLOR: Rgba<u8> = Rgba([33, 150, 243, 255]);

/// Side length of the square painted for a comment marker.
pub const MARKER_SIZE: f64 = 16.0;

/// Paints overlay elements onto a copy of a page raster. `page_top` is the
/// page's container offset, subtracted from each element's `top`.
pub fn paint_overlay<'a>(
    surface: &RgbaImage,
    page_top: f64,
    elements: impl IntoIterator<Item = &'a OverlayElement>,
) -> RgbaImage {
    let mut image = surface.clone();

    for element in elements {
        match element {
            OverlayElement::HighlightBox { left, top, width, height, .. } => {
                let Some((xs, ys)) = clip(&image, *left, top - page_top, *width, *height) else {
                    continue;
                };
                for y in ys {
                    for x in xs.clone() {
                        blend(image.get_pixel_mut(x, y), HIGHLIGHT_COLOR, HIGHLIGHT_ALPHA);
                    }
                }
            }
            OverlayElement::CommentMarker { left, top, .. } => {
                let Some((xs, ys)) = clip(&image, *left, top - page_top, MARKER_SIZE, MARKER_SIZE)
                else {
                    continue;
                };
                for y in ys {
                    for x in xs.clone() {
                        image.put_pixel(x, y, MARKER_COLOR);
                    }
                }
            }
        }
    }

    image
}

fn clip(
    image: &RgbaImage,
    left: f64,
    top: f64,
    width: f64,
    height: f64,
) -> Option<(Range<u32>, Range<u32>)> {
    let x0 = left.max(0.0).floor() as u32;
    let y0 = top.max(0.0).floor() as u32;
    let x1 = ((left + width).ceil().max(0.0) as u32).min(image.width());
    let y1 = ((top + height).ceil().max(0.0) as u32).min(image.height());

    (x0 < x1 && y0 < y1).then_some((x0..x1, y0..y1))
}

fn blend(pixel: &mut Rgba<u8>, color: [u8; 3], alpha: f32) {
    for (channel, source) in pixel.0.iter_mut().zip(color) {
        let mixed = f32::from(*channel) * (1.0 - alpha) + f32::from(source) * alpha;
        *channel = mixed.round() as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    #[test]
    fn highlight_is_blended_in_page_local_space() {
        let surface = RgbaImage::from_pixel(200, 100, WHITE);
        let element =
            OverlayElement::HighlightBox { page: 2, left: 10.0, top: 1005.0, width: 20.0, height: 10.0 };

        let painted = paint_overlay(&surface, 1000.0, [&element]);

        assert_eq!(*painted.get_pixel(15, 10), Rgba([255, 247, 177, 255]));
        assert_eq!(*painted.get_pixel(5, 5), WHITE);
        assert_eq!(*painted.get_pixel(30, 10), WHITE);
        assert_eq!(*surface.get_pixel(15, 10), WHITE);
    }

    #[test]
    fn marker_is_clipped_at_the_surface_edge() {
        let surface = RgbaImage::from_pixel(20, 20, WHITE);
        let element = OverlayElement::CommentMarker {
            page: 1,
            left: 12.0,
            top: 12.0,
            glyph: viewer_core::COMMENT_GLYPH,
            tooltip: "edge".to_owned(),
        };

        let painted = paint_overlay(&surface, 0.0, [&element]);

        assert_eq!(*painted.get_pixel(19, 19), MARKER_COLOR);
        assert_eq!(*painted.get_pixel(11, 11), WHITE);
    }

    #[test]
    fn elements_past_the_surface_are_skipped() {
        let surface = RgbaImage::from_pixel(10, 10, WHITE);
        let element =
            OverlayElement::HighlightBox { page: 1, left: 50.0, top: 50.0, width: 5.0, height: 5.0 };

        assert_eq!(paint_overlay(&surface, 0.0, [&element]), surface);
    }
}
