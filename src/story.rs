use serde::{Deserialize, Serialize};

use crate::errors::TierResult;
use crate::vocabulary::{Field, Genre, Geography, Logistics, PersonalityGenre, Popularity, StoryFormat};

/// One story described by the six form selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryAttributes {
    pub genre: Genre,
    pub geography: Geography,
    pub personality_popularity: Popularity,
    pub personality_genre: PersonalityGenre,
    pub logistics: Logistics,
    pub story_format: StoryFormat,
}

impl StoryAttributes {
    /// Ordinal rank derived from the popularity selection.
    pub fn popularity_ord(&self) -> u8 {
        self.personality_popularity.ordinal()
    }

    /// Display string of the selected value for a field.
    pub fn value(&self, field: Field) -> &'static str {
        match field {
            Field::Genre => self.genre.as_str(),
            Field::Geography => self.geography.as_str(),
            Field::PersonalityPopularity => self.personality_popularity.as_str(),
            Field::PersonalityGenre => self.personality_genre.as_str(),
            Field::Logistics => self.logistics.as_str(),
            Field::StoryFormat => self.story_format.as_str(),
        }
    }

    /// Position of the selected value in the field's vocabulary.
    pub fn value_index(&self, field: Field) -> usize {
        match field {
            Field::Genre => self.genre.index(),
            Field::Geography => self.geography.index(),
            Field::PersonalityPopularity => self.personality_popularity.index(),
            Field::PersonalityGenre => self.personality_genre.index(),
            Field::Logistics => self.logistics.index(),
            Field::StoryFormat => self.story_format.index(),
        }
    }
}

/// Raw submission as it arrives from the HTML form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoryForm {
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub geography: String,
    #[serde(default)]
    pub personality_popularity: String,
    #[serde(default)]
    pub personality_genre: String,
    #[serde(default)]
    pub logistics: String,
    #[serde(default)]
    pub story_format: String,
}

impl StoryForm {
    /// Assemble the single-row record; any value outside the vocabulary is
    /// a validation error naming the field.
    pub fn into_attributes(self) -> TierResult<StoryAttributes> {
        Ok(StoryAttributes {
            genre: self.genre.trim().parse()?,
            geography: self.geography.trim().parse()?,
            personality_popularity: self.personality_popularity.trim().parse()?,
            personality_genre: self.personality_genre.trim().parse()?,
            logistics: self.logistics.trim().parse()?,
            story_format: self.story_format.trim().parse()?,
        })
    }

    pub fn value(&self, field: Field) -> &str {
        match field {
            Field::Genre => &self.genre,
            Field::Geography => &self.geography,
            Field::PersonalityPopularity => &self.personality_popularity,
            Field::PersonalityGenre => &self.personality_genre,
            Field::Logistics => &self.logistics,
            Field::StoryFormat => &self.story_format,
        }
    }
}

impl From<&StoryAttributes> for StoryForm {
    fn from(story: &StoryAttributes) -> Self {
        Self {
            genre: story.genre.as_str().to_string(),
            geography: story.geography.as_str().to_string(),
            personality_popularity: story.personality_popularity.as_str().to_string(),
            personality_genre: story.personality_genre.as_str().to_string(),
            logistics: story.logistics.as_str().to_string(),
            story_format: story.story_format.as_str().to_string(),
        }
    }
}

#[cfg(test)]
pub(crate) fn sports_story() -> StoryAttributes {
    StoryAttributes {
        genre: Genre::SportsNews,
        geography: Geography::Indian,
        personality_popularity: Popularity::High,
        personality_genre: PersonalityGenre::Cricketer,
        logistics: Logistics::OnLocation,
        story_format: StoryFormat::NewsReport,
    }
}
