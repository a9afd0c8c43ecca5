pub mod inference; // Generative and predictive service clients
pub mod recommendations; // Prompting, validation and caching of care recommendations
pub mod outcome; // Length of stay, complication risk, recovery trajectory
