/// Identifies an indirect object by its object number and generation number.
pub type ObjectId = (u32, u16);
