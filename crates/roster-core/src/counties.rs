//! County metadata seeded into the store for the read surface.

/// All Wisconsin counties in alphabetical order. A county's metadata id is
/// its 1-based position in this list.
pub const WISCONSIN_COUNTIES: [&str; 72] = [
    "Adams", "Ashland", "Barron", "Bayfield", "Brown", "Buffalo", "Burnett", "Calumet",
    "Chippewa", "Clark", "Columbia", "Crawford", "Dane", "Dodge", "Door", "Douglas",
    "Dunn", "Eau Claire", "Florence", "Fond du Lac", "Forest", "Grant", "Green", "Green Lake",
    "Iowa", "Iron", "Jackson", "Jefferson", "Juneau", "Kenosha", "Kewaunee", "La Crosse",
    "Lafayette", "Langlade", "Lincoln", "Manitowoc", "Marathon", "Marinette", "Marquette",
    "Menominee", "Milwaukee", "Monroe", "Oconto", "Oneida", "Outagamie", "Ozaukee", "Pepin",
    "Pierce", "Polk", "Portage", "Price", "Racine", "Richland", "Rock", "Rusk", "Sauk",
    "Sawyer", "Shawano", "Sheboygan", "St. Croix", "Taylor", "Trempealeau", "Vernon", "Vilas",
    "Walworth", "Washburn", "Washington", "Waukesha", "Waupaca", "Waushara", "Winnebago",
    "Wood",
];
