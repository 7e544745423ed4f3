use crate::parser::{ColorTable, DecodeError, DecodedFrame, DisposalMethod, GlobalHeader};

use log::trace;

const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// What `RestoreToBackground` paints into the disposed rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackgroundFill {
    /// The global color table entry at the background index, or transparent
    /// when there is no such entry.
    #[default]
    Color,
    Transparent,
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    left: usize,
    top: usize,
    width: usize,
    height: usize,
}

impl Rect {
    fn of(frame: &DecodedFrame) -> Self {
        let descriptor = &frame.descriptor;
        Self {
            left: descriptor.left.into(),
            top: descriptor.top.into(),
            width: descriptor.width.into(),
            height: descriptor.height.into(),
        }
    }
}

/// Applies decoded frames onto a persistent RGBA canvas the size of the
/// logical screen.
#[derive(Debug)]
pub struct Compositor {
    width: usize,
    height: usize,
    canvas: Vec<u8>,
    // canvas as it was before the last frame disposed with RestoreToPrevious
    snapshot: Option<Vec<u8>>,
    previous: Option<(DisposalMethod, Rect)>,
    global_color_table: Option<ColorTable>,
    background: [u8; 4],
}

impl Compositor {
    pub fn new(header: &GlobalHeader, fill: BackgroundFill) -> Self {
        let width = usize::from(header.screen_width);
        let height = usize::from(header.screen_height);

        let background = match (fill, &header.global_color_table) {
            (BackgroundFill::Color, Some(table)) => table
                .get(header.background_color_index)
                .map(|[r, g, b]| [r, g, b, 0xff])
                .unwrap_or(TRANSPARENT),
            _ => TRANSPARENT,
        };

        Self {
            width,
            height,
            canvas: vec![0; width * height * 4],
            snapshot: None,
            previous: None,
            global_color_table: header.global_color_table.clone(),
            background,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Disposes of the previous frame, draws `frame` and returns a copy of
    /// the resulting canvas.
    pub fn composite(&mut self, frame: &DecodedFrame) -> Result<Vec<u8>, DecodeError> {
        let table = frame
            .descriptor
            .local_color_table
            .as_ref()
            .or(self.global_color_table.as_ref())
            .ok_or_else(|| DecodeError::UnsupportedFeature("frame without a color table".into()))?;

        if let Some((disposal, rect)) = self.previous.take() {
            trace!("disposing previous frame with {:?}", disposal);
            match disposal {
                DisposalMethod::Unspecified | DisposalMethod::DoNotDispose => {}
                DisposalMethod::RestoreToBackground => {
                    fill(&mut self.canvas, self.width, self.height, rect, self.background)
                }
                DisposalMethod::RestoreToPrevious => {
                    if let Some(snapshot) = &self.snapshot {
                        self.canvas.copy_from_slice(snapshot);
                    }
                }
            }
        }

        let control = frame.control.unwrap_or_default();
        if control.disposal_method == DisposalMethod::RestoreToPrevious {
            match &mut self.snapshot {
                Some(snapshot) => snapshot.copy_from_slice(&self.canvas),
                None => self.snapshot = Some(self.canvas.clone()),
            }
        }

        let rect = Rect::of(frame);
        let rows: Box<dyn Iterator<Item = usize>> = if frame.descriptor.interlaced {
            Box::new(interlaced_rows(rect.height))
        } else {
            Box::new(0..rect.height)
        };

        for (row, indices) in rows.zip(frame.indices.chunks(rect.width.max(1))) {
            let y = rect.top + row;
            if y >= self.height {
                continue;
            }

            for (column, &index) in indices.iter().take(rect.width).enumerate() {
                let x = rect.left + column;
                if x >= self.width || control.transparent_index == Some(index) {
                    continue;
                }
                // out of range indices leave the canvas as is
                let Some([r, g, b]) = table.get(index) else {
                    continue;
                };

                let offset = (y * self.width + x) * 4;
                self.canvas[offset..offset + 4].copy_from_slice(&[r, g, b, 0xff]);
            }
        }

        self.previous = Some((control.disposal_method, rect));

        Ok(self.canvas.clone())
    }
}

fn fill(canvas: &mut [u8], width: usize, height: usize, rect: Rect, color: [u8; 4]) {
    let right = (rect.left + rect.width).min(width);
    let bottom = (rect.top + rect.height).min(height);

    for y in rect.top..bottom {
        for x in rect.left..right {
            let offset = (y * width + x) * 4;
            canvas[offset..offset + 4].copy_from_slice(&color);
        }
    }
}

/// Maps the n-th row of an interlaced image to its position on screen.
fn interlaced_rows(height: usize) -> impl Iterator<Item = usize> {
    (0..height)
        .step_by(8)
        .chain((4..height).step_by(8))
        .chain((2..height).step_by(4))
        .chain((1..height).step_by(2))
}
