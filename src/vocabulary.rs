//! Fixed vocabularies offered by the story form.
//!
//! Each categorical field is a closed enumeration. Parsing a raw form value
//! is the only place an out-of-vocabulary string can appear, so it is
//! rejected there instead of deep inside the encoder.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::errors::TierError;

/// The six categorical columns the models were trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Genre,
    Geography,
    PersonalityPopularity,
    PersonalityGenre,
    Logistics,
    StoryFormat,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Genre,
        Field::Geography,
        Field::PersonalityPopularity,
        Field::PersonalityGenre,
        Field::Logistics,
        Field::StoryFormat,
    ];

    /// Column name used by the encoder artifacts.
    pub fn column(&self) -> &'static str {
        match self {
            Field::Genre => "Genre",
            Field::Geography => "Geography",
            Field::PersonalityPopularity => "Personality Popularity",
            Field::PersonalityGenre => "Personality-Genre",
            Field::Logistics => "Logistics",
            Field::StoryFormat => "Story_Format",
        }
    }

    /// Name of the matching model input.
    pub fn input_name(&self) -> String {
        format!("{}_input", self.column())
    }

    /// Key used by HTML forms and the JSON API.
    pub fn form_key(&self) -> &'static str {
        match self {
            Field::Genre => "genre",
            Field::Geography => "geography",
            Field::PersonalityPopularity => "personality_popularity",
            Field::PersonalityGenre => "personality_genre",
            Field::Logistics => "logistics",
            Field::StoryFormat => "story_format",
        }
    }

    /// Label shown next to the dropdown.
    pub fn label(&self) -> &'static str {
        match self {
            Field::Genre => "Genre",
            Field::Geography => "Geography",
            Field::PersonalityPopularity => "Personality Popularity (H/M/L)",
            Field::PersonalityGenre => "Personality Genre",
            Field::Logistics => "Logistics",
            Field::StoryFormat => "Story Format",
        }
    }

    pub fn vocabulary(&self) -> &'static [&'static str] {
        match self {
            Field::Genre => Genre::LABELS,
            Field::Geography => Geography::LABELS,
            Field::PersonalityPopularity => Popularity::LABELS,
            Field::PersonalityGenre => PersonalityGenre::LABELS,
            Field::Logistics => Logistics::LABELS,
            Field::StoryFormat => StoryFormat::LABELS,
        }
    }

    pub fn from_column(column: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.column() == column)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident, $field:expr, { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub const LABELS: &'static [&'static str] = &[$($label),+];
            pub const FIELD: Field = $field;

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Position in the displayed vocabulary.
            pub fn index(&self) -> usize {
                *self as usize
            }
        }

        impl FromStr for $name {
            type Err = TierError;

            fn from_str(input: &str) -> Result<Self, Self::Err> {
                match input {
                    $($label => Ok($name::$variant),)+
                    other => Err(TierError::validation(
                        Self::FIELD.form_key(),
                        format!("'{other}' is not a known {} value", Self::FIELD.column()),
                    )),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

vocabulary!(
    /// Story genre
    Genre, Field::Genre, {
        Astrology => "ASTROLOGY",
        CareerEducation => "CAREER/EDUCATION",
        CrimeLawOrder => "CRIME/LAW & ORDER",
        EntertainmentNews => "ENTERTAINMENT NEWS",
        EventCelebrations => "EVENT/CELEBRATIONS",
        FinancialNews => "FINANCIAL NEWS",
        Health => "HEALTH",
        IndiaPak => "INDIA-PAK",
        Mishaps => "MISHAPS/FAILURE OF MACHINERY",
        NationalThreatDefence => "NATIONAL THREAT/DEFENCE NEWS",
        PoliticalGovernment => "POLITICAL NEWS/GOVERNMENT NEWS",
        ReligiousFaith => "RELIGIOUS / FAITH",
        ScienceSpace => "SCIENCE/SPACE",
        SportsNews => "SPORTS NEWS",
        War => "WAR",
        WeatherEnvironment => "WEATHER/ENVIRONMENT",
        Other => "OTHER",
    }
);

vocabulary!(
    /// Where the story takes place
    Geography, Field::Geography, {
        Indian => "INDIAN",
        International => "INTERNATIONAL",
        Bihar => "BIHAR",
        Chandigarh => "CHANDIGARH",
        Chhattisgarh => "CHHATTISGARH",
        Delhi => "DELHI",
        Gujarat => "GUJARAT",
        Haryana => "HARYANA",
        HimachalPradesh => "HIMACHAL PRADESH",
        JammuAndKashmir => "JAMMU AND KASHMIR",
        Jharkhand => "JHARKHAND",
        Karnataka => "KARNATAKA",
        MadhyaPradesh => "MADHYA PRADESH",
        Maharashtra => "MAHARASHTRA",
        Manipur => "MANIPUR",
        Rajasthan => "RAJASTHAN",
        Telangana => "TELANGANA",
        UttarPradesh => "UTTAR PRADESH",
        Uttarakhand => "UTTARAKHAND",
        WestBengal => "WEST BENGAL",
        Other => "OTHER",
    }
);

vocabulary!(
    /// Popularity of the main personality (High / Medium / Low)
    Popularity, Field::PersonalityPopularity, {
        High => "H",
        Medium => "M",
        Low => "L",
    }
);

vocabulary!(
    /// Category of the main personality
    PersonalityGenre, Field::PersonalityGenre, {
        Astrologer => "Astrologer",
        Cricketer => "Cricketer",
        Defense => "Defense",
        Entertainer => "Entertainer",
        International => "International",
        Religious => "Religious",
        Aap => "AAP",
        Aimim => "AIMIM",
        BajrangDal => "Bajrang Dal",
        Bjp => "BJP",
        Bsp => "BSP",
        Dmk => "DMK",
        Inc => "INC",
        Jdu => "JDU",
        Jmm => "JMM",
        Nc => "NC",
        Ncp => "NCP",
        Rjd => "RJD",
        RssVhp => "RSS-VHP",
        Sbsp => "SBSP",
        Sp => "SP",
        Ss => "SS",
        Tmc => "TMC",
        Other => "OTHER",
    }
);

vocabulary!(
    /// Where the story was shot
    Logistics, Field::Logistics, {
        OnLocation => "ON LOCATION",
        InStudio => "IN STUDIO",
        Both => "BOTH",
    }
);

vocabulary!(
    /// Presentation format
    StoryFormat, Field::StoryFormat, {
        DebateOrDiscussion => "DEBATE OR DISCUSSION",
        Interview => "INTERVIEW",
        NewsReport => "NEWS REPORT",
    }
);

impl Popularity {
    /// Manual ordinal rank: H -> 2, M -> 1, L -> 0.
    pub fn ordinal(&self) -> u8 {
        match self {
            Popularity::High => 2,
            Popularity::Medium => 1,
            Popularity::Low => 0,
        }
    }
}
