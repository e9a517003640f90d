use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

/// A single detector output: box, confidence in `[0, 1]`, class.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class: ObjectClass,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, class: ObjectClass) -> Self {
        Self {
            bbox,
            confidence,
            class,
        }
    }

    pub fn person(bbox: BoundingBox, confidence: f32) -> Self {
        Self::new(bbox, confidence, ObjectClass::Person)
    }
}

#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectClass {
    Person,
    Vehicle,
    Animal,
    Package,
    Unknown,
}

impl ObjectClass {
    /// Coarse class for a COCO-80 class index.
    pub fn from_coco_id(id: usize) -> Self {
        match id {
            0 => ObjectClass::Person,
            1..=8 => ObjectClass::Vehicle,
            14..=23 => ObjectClass::Animal,
            24 | 26 | 28 => ObjectClass::Package,
            _ => ObjectClass::Unknown,
        }
    }
}

/// Splits out the person detections, preserving detector order.
pub fn persons_only(detections: &[Detection]) -> Vec<Detection> {
    detections
        .iter()
        .filter(|d| d.class == ObjectClass::Person)
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coco_ids_map_to_coarse_classes() {
        assert_eq!(ObjectClass::from_coco_id(0), ObjectClass::Person);
        assert_eq!(ObjectClass::from_coco_id(2), ObjectClass::Vehicle);
        assert_eq!(ObjectClass::from_coco_id(16), ObjectClass::Animal);
        assert_eq!(ObjectClass::from_coco_id(26), ObjectClass::Package);
        assert_eq!(ObjectClass::from_coco_id(56), ObjectClass::Unknown);
    }

    #[test]
    fn persons_only_drops_other_classes() {
        let b = BoundingBox::new(0, 0, 4, 4).unwrap();
        let dets = [
            Detection::new(b, 0.9, ObjectClass::Vehicle),
            Detection::person(b, 0.3),
            Detection::new(b, 0.8, ObjectClass::Unknown),
            Detection::person(b, 0.6),
        ];
        let people = persons_only(&dets);
        assert_eq!(people.len(), 2);
        assert_eq!(people[0].confidence, 0.3);
        assert_eq!(people[1].confidence, 0.6);
    }
}
