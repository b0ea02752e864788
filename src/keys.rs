/// Per-key pressed flags and strike velocities, indexed from the lowest key.
///
/// Indices are not range-checked here; callers validate notes before
/// mutating.
#[derive(Debug, Clone)]
pub struct KeyStates {
    pressed: Box<[bool]>,
    velocities: Box<[u8]>,
}

impl KeyStates {
    pub fn new(num_keys: usize) -> Self {
        Self {
            pressed: vec![false; num_keys].into_boxed_slice(),
            velocities: vec![0; num_keys].into_boxed_slice(),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pressed.len()
    }

    pub fn set_pressed(&mut self, index: usize, velocity: u8) {
        self.pressed[index] = true;
        self.velocities[index] = velocity;
    }

    /// Velocity is left as-is; it is only read while the key is held.
    pub fn set_released(&mut self, index: usize) {
        self.pressed[index] = false;
    }

    #[cfg(test)]
    pub fn is_pressed(&self, index: usize) -> bool {
        self.pressed[index]
    }

    #[cfg(test)]
    pub fn velocity_of(&self, index: usize) -> u8 {
        self.velocities[index]
    }

    /// Held keys as `(index, velocity)`, lowest index first.
    pub fn pressed(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.pressed
            .iter()
            .zip(self.velocities.iter())
            .enumerate()
            .filter_map(|(index, (&held, &velocity))| held.then_some((index, velocity)))
    }
}

#[cfg(test)]
mod test {
    use super::KeyStates;

    #[test]
    fn starts_released() {
        let keys = KeyStates::new(76);
        assert_eq!(keys.len(), 76);
        assert!((0..76).all(|i| !keys.is_pressed(i)));
        assert_eq!(keys.pressed().count(), 0);
    }

    #[test]
    fn press_and_release() {
        let mut keys = KeyStates::new(8);
        keys.set_pressed(5, 100);
        keys.set_pressed(2, 30);

        assert!(keys.is_pressed(5));
        assert_eq!(keys.velocity_of(5), 100);
        assert_eq!(keys.pressed().collect::<Vec<_>>(), vec![(2, 30), (5, 100)]);

        keys.set_released(5);
        assert!(!keys.is_pressed(5));
        assert_eq!(keys.velocity_of(5), 100);
        assert_eq!(keys.pressed().collect::<Vec<_>>(), vec![(2, 30)]);
    }

    #[test]
    fn restrike_overwrites_velocity() {
        let mut keys = KeyStates::new(4);
        keys.set_pressed(1, 10);
        keys.set_pressed(1, 90);
        assert_eq!(keys.pressed().collect::<Vec<_>>(), vec![(1, 90)]);
    }

    #[test]
    fn enumeration_is_restartable() {
        let mut keys = KeyStates::new(4);
        keys.set_pressed(3, 1);
        keys.set_pressed(0, 2);

        let first: Vec<_> = keys.pressed().collect();
        let second: Vec<_> = keys.pressed().collect();
        assert_eq!(first, second);
    }
}
