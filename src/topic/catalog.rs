use serde::{Deserialize, Serialize};

use crate::error::PressroomError;

/// One selectable topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicEntry {
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// The universe of topics the selector draws from. Never empty.
#[derive(Debug, Clone)]
pub struct TopicCatalog {
    entries: Vec<TopicEntry>,
}

impl TopicCatalog {
    pub fn new(entries: Vec<TopicEntry>) -> Result<Self, PressroomError> {
        if entries.is_empty() {
            return Err(PressroomError::Config("topic catalog is empty".into()));
        }
        if let Some(bad) = entries
            .iter()
            .find(|e| e.title.trim().is_empty() || e.category.trim().is_empty())
        {
            return Err(PressroomError::Config(format!(
                "topic entry needs a title and a category: {bad:?}"
            )));
        }
        Ok(Self { entries })
    }

    /// Use `entries` when given, the built-in catalog otherwise.
    pub fn from_config(entries: &[TopicEntry]) -> Result<Self, PressroomError> {
        if entries.is_empty() {
            Ok(Self::builtin())
        } else {
            Self::new(entries.to_vec())
        }
    }

    pub fn entries(&self) -> &[TopicEntry] {
        &self.entries
    }

    /// Distinct categories in catalog order.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.category.as_str()) {
                seen.push(entry.category.as_str());
            }
        }
        seen
    }

    pub fn builtin() -> Self {
        let entries = BUILTIN
            .iter()
            .map(|(title, category, keywords)| TopicEntry {
                title: (*title).to_string(),
                category: (*category).to_string(),
                keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
            })
            .collect();
        Self { entries }
    }
}

const BUILTIN: &[(&str, &str, &[&str])] = &[
    (
        "Riding the Old Salt Roads: A Week of Village-to-Village Cycling",
        "Heritage Routes",
        &["salt road cycling", "village bike tour", "heritage cycling route"],
    ),
    (
        "Monastery Loops: Cycling Between Hilltop Temples",
        "Heritage Routes",
        &["temple cycling loop", "monastery bike ride"],
    ),
    (
        "Switchbacks and Tea Terraces: A Highland Climbing Guide",
        "Highlands",
        &["highland cycling", "tea terrace climbs", "mountain switchbacks"],
    ),
    (
        "Cloud Forest Descents for Confident Riders",
        "Highlands",
        &["cloud forest cycling", "descent technique"],
    ),
    (
        "Lagoon to Lighthouse: A Gentle Coastal Ride",
        "Coastal Routes",
        &["coastal cycling", "lighthouse ride", "lagoon bike path"],
    ),
    (
        "Island Hopping by Bicycle and Ferry",
        "Coastal Routes",
        &["ferry cycling", "island bike tour"],
    ),
    (
        "Spotting Elephants from the Saddle: Wildlife Corridors by Bike",
        "Wildlife",
        &["wildlife cycling", "elephant corridor ride"],
    ),
    (
        "Birding Rides Around the Wetland Reserves",
        "Wildlife",
        &["birdwatching by bike", "wetland cycling"],
    ),
    (
        "Your First Multi-Day Tour: Packing, Pacing and Rest Days",
        "Planning",
        &["multi-day cycling tour", "bike touring packing list"],
    ),
    (
        "Monsoon Seasons Explained for Touring Cyclists",
        "Planning",
        &["best season to cycle", "monsoon cycling"],
    ),
    (
        "Gravel Byways Through Rubber Plantations",
        "Adventure",
        &["gravel cycling", "plantation tracks"],
    ),
    (
        "Market Mornings: A Street Food Ride Through the Old Town",
        "Culinary",
        &["food cycling tour", "street food by bike"],
    ),
    (
        "Spice Garden Stops on a Two-Wheeled Cooking Trail",
        "Culinary",
        &["spice garden tour", "culinary bike tour"],
    ),
    (
        "Easy Family Rides on Quiet Canal Paths",
        "Family Travel",
        &["family cycling", "kid-friendly bike routes"],
    ),
    (
        "Pedal-Assist Touring: When an E-Bike Makes Sense",
        "E-Bike",
        &["e-bike tour", "electric bike touring"],
    ),
    (
        "Riding Solo: Safety, Navigation and Meeting Locals",
        "Solo Travel",
        &["solo cycling", "solo bike travel"],
    ),
    (
        "Sunrise Yoga and Afternoon Rides: A Recovery Retreat",
        "Wellness",
        &["cycling retreat", "yoga and cycling"],
    ),
    (
        "Photographing the Road: Camera Kit for Cycle Tourists",
        "Photography",
        &["cycling photography", "camera for bike touring"],
    ),
    (
        "Touring on a Shoestring: Guesthouses, Trains and Back Roads",
        "Budget Travel",
        &["budget cycling tour", "cheap bike travel"],
    ),
    (
        "Reading the Road: Traffic Customs for Visiting Cyclists",
        "Safety",
        &["cycling road safety", "traffic tips for cyclists"],
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = TopicCatalog::builtin();
        assert!(TopicCatalog::new(catalog.entries().to_vec()).is_ok());
        assert!(catalog.categories().len() >= 10);
    }

    #[test]
    fn builtin_titles_are_unique() {
        let catalog = TopicCatalog::builtin();
        let mut titles: Vec<String> = catalog
            .entries()
            .iter()
            .map(|e| e.title.to_lowercase())
            .collect();
        titles.sort();
        titles.dedup();
        assert_eq!(titles.len(), catalog.entries().len());
    }

    #[test]
    fn empty_catalog_is_rejected() {
        assert!(matches!(
            TopicCatalog::new(vec![]),
            Err(PressroomError::Config(_))
        ));
    }

    #[test]
    fn blank_category_is_rejected() {
        let entry = TopicEntry {
            title: "Something".into(),
            category: " ".into(),
            keywords: vec![],
        };
        assert!(TopicCatalog::new(vec![entry]).is_err());
    }

    #[test]
    fn config_entries_override_builtin() {
        let entry = TopicEntry {
            title: "Only One".into(),
            category: "Solo".into(),
            keywords: vec![],
        };
        let catalog = TopicCatalog::from_config(std::slice::from_ref(&entry)).unwrap();
        assert_eq!(catalog.entries(), &[entry]);
        assert_eq!(
            TopicCatalog::from_config(&[]).unwrap().entries().len(),
            TopicCatalog::builtin().entries().len()
        );
    }
}
