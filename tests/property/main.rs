mod decoder;
mod journal;
mod status;
