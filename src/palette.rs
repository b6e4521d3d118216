// Colour palette addressed by the templates' numeric colour index

use plotters::style::RGBColor;

/// Indexed colours in the classic gnuplot order
#[derive(Debug, Clone)]
pub struct ColorPalette {
    colors: Vec<RGBColor>,
}

impl ColorPalette {
    /// Index 0 is black; 1 onwards are red, green, blue, magenta, cyan,
    /// sienna, orange and coral, repeating
    pub fn classic() -> Self {
        ColorPalette {
            colors: vec![
                RGBColor(255, 0, 0),
                RGBColor(0, 160, 0),
                RGBColor(0, 0, 255),
                RGBColor(255, 0, 255),
                RGBColor(0, 200, 200),
                RGBColor(160, 82, 45),
                RGBColor(255, 165, 0),
                RGBColor(255, 127, 80),
            ],
        }
    }

    /// Colour for a template colour index (wraps around after the last entry)
    pub fn get_color(&self, index: u32) -> RGBColor {
        match index {
            0 => RGBColor(0, 0, 0),
            n => self.colors[(n as usize - 1) % self.colors.len()],
        }
    }
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self::classic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_palette() {
        let palette = ColorPalette::classic();
        assert_eq!(palette.get_color(0), RGBColor(0, 0, 0));
        assert_eq!(palette.get_color(1), RGBColor(255, 0, 0));
        assert_eq!(palette.get_color(3), RGBColor(0, 0, 255));
    }

    #[test]
    fn test_palette_wraps() {
        let palette = ColorPalette::classic();
        assert_eq!(palette.get_color(9), palette.get_color(1));
        assert_eq!(palette.get_color(10), RGBColor(0, 160, 0));
    }
}
