const US_BASE_URL: &str = "https://share2.dexcom.com/ShareWebServices/Services";
const OUS_BASE_URL: &str = "https://shareous1.dexcom.com/ShareWebServices/Services";

/// Share service deployment region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    Us,
    OutsideUs,
}

impl Region {
    /// Map the region argument onto a region.
    ///
    /// Exactly the literal "OUS" selects the outside-US deployment,
    /// anything else (including lowercase variants and the empty string)
    /// selects US. The match is deliberately case sensitive.
    pub fn from_arg(region: &str) -> Region {
        if region == "OUS" {
            Region::OutsideUs
        } else {
            Region::Us
        }
    }

    pub fn get_base_url(&self) -> &str {
        match self {
            Region::Us => US_BASE_URL,
            Region::OutsideUs => OUS_BASE_URL,
        }
    }

    pub fn get_name(&self) -> &str {
        match self {
            Region::Us => "US",
            Region::OutsideUs => "OUS",
        }
    }
}
