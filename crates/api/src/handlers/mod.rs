pub mod arrangements;
