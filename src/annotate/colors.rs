use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use image::Rgb;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Label whose color the user picks.
pub const PERSON_LABEL: &str = "person";

/// Person color until the user picks one (green).
pub const DEFAULT_PERSON_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// How first-seen labels get their color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorMode {
    /// Unseeded random draw; colors differ between runs.
    #[default]
    Random,
    /// Random draw from a fixed seed; reproducible for a given label order.
    Seeded(u64),
    /// Derived from the SHA-256 of the label; identical across runs.
    Hashed,
}

impl FromStr for ColorMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim().to_ascii_lowercase();
        match value.as_str() {
            "random" => Ok(ColorMode::Random),
            "hashed" | "hash" => Ok(ColorMode::Hashed),
            _ => match value.strip_prefix("seeded:") {
                Some(seed) => seed
                    .parse()
                    .map(ColorMode::Seeded)
                    .map_err(|_| anyhow!("color mode seed must be an integer, got '{}'", seed)),
                None => Err(anyhow!(
                    "unknown color mode '{}' (expected random|hashed|seeded:<n>)",
                    value
                )),
            },
        }
    }
}

/// Label to color assignment.
///
/// The map only grows: once a label has a color it keeps it for the life of
/// the policy. `person` bypasses the map and always resolves to the current
/// override color.
pub struct ColorPolicy {
    person: Rgb<u8>,
    assigned: HashMap<String, Rgb<u8>>,
    mode: ColorMode,
    rng: StdRng,
}

impl ColorPolicy {
    pub fn new(mode: ColorMode, person: Rgb<u8>) -> Self {
        let rng = match mode {
            ColorMode::Seeded(seed) => StdRng::seed_from_u64(seed),
            ColorMode::Random | ColorMode::Hashed => StdRng::from_entropy(),
        };
        Self {
            person,
            assigned: HashMap::new(),
            mode,
            rng,
        }
    }

    pub fn mode(&self) -> ColorMode {
        self.mode
    }

    pub fn person_color(&self) -> Rgb<u8> {
        self.person
    }

    pub fn set_person_color(&mut self, color: Rgb<u8>) {
        if color != self.person {
            log::info!(
                "ColorPolicy: person color set to ({}, {}, {})",
                color[0],
                color[1],
                color[2]
            );
        }
        self.person = color;
    }

    /// Color for `label`, assigning one on first sight.
    pub fn color_for(&mut self, label: &str) -> Rgb<u8> {
        if label == PERSON_LABEL {
            return self.person;
        }
        if let Some(color) = self.assigned.get(label) {
            return *color;
        }
        let color = match self.mode {
            ColorMode::Hashed => hashed_color(label),
            ColorMode::Random | ColorMode::Seeded(_) => Rgb([
                self.rng.gen::<u8>(),
                self.rng.gen::<u8>(),
                self.rng.gen::<u8>(),
            ]),
        };
        self.assigned.insert(label.to_string(), color);
        color
    }

    /// Already-assigned color, without assigning.
    pub fn peek(&self, label: &str) -> Option<Rgb<u8>> {
        if label == PERSON_LABEL {
            return Some(self.person);
        }
        self.assigned.get(label).copied()
    }

    /// Number of labels holding an assigned color (person excluded).
    pub fn assigned_len(&self) -> usize {
        self.assigned.len()
    }
}

impl Default for ColorPolicy {
    fn default() -> Self {
        Self::new(ColorMode::default(), DEFAULT_PERSON_COLOR)
    }
}

fn hashed_color(label: &str) -> Rgb<u8> {
    let digest = Sha256::digest(label.as_bytes());
    Rgb([digest[0], digest[1], digest[2]])
}

/// Parse `"r,g,b"` into a color.
pub fn parse_rgb(value: &str) -> Result<Rgb<u8>> {
    let parts: Vec<&str> = value.split(',').map(|part| part.trim()).collect();
    if parts.len() != 3 {
        return Err(anyhow!("color must be r,g,b, got '{}'", value));
    }
    let mut channels = [0u8; 3];
    for (channel, part) in channels.iter_mut().zip(&parts) {
        *channel = part
            .parse()
            .map_err(|_| anyhow!("color channel '{}' is not in 0..=255", part))?;
    }
    Ok(Rgb(channels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_always_uses_override() {
        let mut policy = ColorPolicy::new(ColorMode::Seeded(7), DEFAULT_PERSON_COLOR);
        assert_eq!(policy.color_for("person"), DEFAULT_PERSON_COLOR);

        policy.set_person_color(Rgb([255, 0, 0]));
        assert_eq!(policy.color_for("person"), Rgb([255, 0, 0]));
        assert_eq!(policy.assigned_len(), 0);
    }

    #[test]
    fn labels_keep_their_first_color() {
        let mut policy = ColorPolicy::new(ColorMode::Random, DEFAULT_PERSON_COLOR);
        let dog = policy.color_for("dog");
        let cat = policy.color_for("cat");
        for _ in 0..10 {
            assert_eq!(policy.color_for("dog"), dog);
            assert_eq!(policy.color_for("cat"), cat);
        }
        assert_eq!(policy.assigned_len(), 2);
        assert_eq!(policy.peek("dog"), Some(dog));
        assert_eq!(policy.peek("bird"), None);
    }

    #[test]
    fn seeded_mode_is_reproducible() {
        let mut a = ColorPolicy::new(ColorMode::Seeded(42), DEFAULT_PERSON_COLOR);
        let mut b = ColorPolicy::new(ColorMode::Seeded(42), DEFAULT_PERSON_COLOR);
        for label in ["dog", "car", "cup"] {
            assert_eq!(a.color_for(label), b.color_for(label));
        }
    }

    #[test]
    fn hashed_mode_ignores_assignment_order() {
        let mut a = ColorPolicy::new(ColorMode::Hashed, DEFAULT_PERSON_COLOR);
        let mut b = ColorPolicy::new(ColorMode::Hashed, DEFAULT_PERSON_COLOR);
        let a_dog = a.color_for("dog");
        b.color_for("car");
        assert_eq!(b.color_for("dog"), a_dog);
    }

    #[test]
    fn parses_color_modes() -> Result<()> {
        assert_eq!("random".parse::<ColorMode>()?, ColorMode::Random);
        assert_eq!("Hashed".parse::<ColorMode>()?, ColorMode::Hashed);
        assert_eq!("seeded:9".parse::<ColorMode>()?, ColorMode::Seeded(9));
        assert!("seeded:x".parse::<ColorMode>().is_err());
        assert!("rainbow".parse::<ColorMode>().is_err());
        Ok(())
    }

    #[test]
    fn parses_rgb_triples() -> Result<()> {
        assert_eq!(parse_rgb("255, 0, 10")?, Rgb([255, 0, 10]));
        assert!(parse_rgb("256,0,0").is_err());
        assert!(parse_rgb("1,2").is_err());
        Ok(())
    }
}
