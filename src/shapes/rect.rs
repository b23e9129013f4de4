/// Edge-based rectangle on the overlay surface.
///
/// Built by starting "inverted" (left/top past the far edges of the surface,
/// right/bottom at zero) and growing with [`BoundingRect::union`], so the
/// first point collapses it onto itself. A rect that never saw a point stays
/// inverted and reports [`BoundingRect::is_empty`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BoundingRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl BoundingRect {
    pub fn inverted(surface_width: u32, surface_height: u32) -> BoundingRect {
        BoundingRect {
            left: surface_width as i32,
            top: surface_height as i32,
            right: 0,
            bottom: 0,
        }
    }

    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> BoundingRect {
        BoundingRect {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn union(&mut self, x: i32, y: i32) -> &mut BoundingRect {
        self.left = self.left.min(x);
        self.right = self.right.max(x);
        self.top = self.top.min(y);
        self.bottom = self.bottom.max(y);

        self
    }

    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn center_x(&self) -> f32 {
        (self.left + self.right) as f32 / 2.
    }

    /// Same rect grown by `by` pixels on every side (shrunk when negative).
    pub fn outset(&self, by: i32) -> BoundingRect {
        BoundingRect {
            left: self.left - by,
            top: self.top - by,
            right: self.right + by,
            bottom: self.bottom + by,
        }
    }
}

impl TryFrom<BoundingRect> for imageproc::rect::Rect {
    type Error = ();

    fn try_from(r: BoundingRect) -> Result<imageproc::rect::Rect, ()> {
        if r.is_empty() {
            return Err(());
        }

        Ok(imageproc::rect::Rect::at(r.left, r.top).of_size(r.width() as u32, r.height() as u32))
    }
}
