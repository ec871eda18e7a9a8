/// Maps a normalized value in `[0, 1]` to an RGBA color.
pub trait ColorScale: Send + Sync {
    fn color_at(&self, t: f64) -> [f32; 4];
}

impl<F> ColorScale for F
where
    F: Fn(f64) -> [f32; 4] + Send + Sync,
{
    fn color_at(&self, t: f64) -> [f32; 4] {
        self(t)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorError(pub String);

impl std::fmt::Display for ColorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid color {:?}", self.0)
    }
}

impl std::error::Error for ColorError {}

/// Parses `#rgb` or `#rrggbb`.
pub fn parse_hex_color(s: &str) -> Result<[f32; 4], ColorError> {
    let err = || ColorError(s.to_string());
    let hex = s.strip_prefix('#').ok_or_else(err)?;
    let digits: Vec<u8> = match hex.len() {
        3 => hex
            .chars()
            .map(|c| c.to_digit(16).map(|d| (d * 17) as u8))
            .collect::<Option<_>>()
            .ok_or_else(err)?,
        6 => (0..3)
            .map(|i| hex.get(i * 2..i * 2 + 2).and_then(|b| u8::from_str_radix(b, 16).ok()))
            .collect::<Option<_>>()
            .ok_or_else(err)?,
        _ => return Err(err()),
    };
    let [r, g, b] = digits[..] else {
        return Err(err());
    };
    Ok([r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0])
}

/// Piecewise-linear ramp over evenly spaced stops.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRamp {
    stops: Vec<[f32; 4]>,
}

impl LinearRamp {
    pub fn new(stops: Vec<[f32; 4]>) -> Self {
        Self { stops }
    }

    pub fn from_hex<S: AsRef<str>>(stops: &[S]) -> Result<Self, ColorError> {
        let stops = stops
            .iter()
            .map(|s| parse_hex_color(s.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(Self::new(stops))
    }
}

impl ColorScale for LinearRamp {
    fn color_at(&self, t: f64) -> [f32; 4] {
        match self.stops.as_slice() {
            [] => [0.0, 0.0, 0.0, 0.0],
            [only] => *only,
            stops => {
                let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
                let scaled = t * (stops.len() - 1) as f64;
                let i = (scaled.floor() as usize).min(stops.len() - 2);
                let f = (scaled - i as f64) as f32;
                let (a, b) = (stops[i], stops[i + 1]);
                std::array::from_fn(|c| a[c] + (b[c] - a[c]) * f)
            }
        }
    }
}

/// Path style applied to one rendered region.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FeatureStyle {
    pub fill_color: [f32; 4],
    pub fill_opacity: f32,
    /// Outline width; zero hides the outline.
    pub weight: f32,
}

impl FeatureStyle {
    pub const HOVER: FeatureStyle = FeatureStyle::choropleth([1.0, 1.0, 1.0, 1.0]);

    pub const fn choropleth(fill_color: [f32; 4]) -> Self {
        Self {
            fill_color,
            fill_opacity: 1.0,
            weight: 0.0,
        }
    }
}
